//! Transparency log submission.
//!
//! The signed envelope and its certificate are recorded as an `intoto`
//! v0.0.1 entry. Resubmitting the same entry is idempotent: the log answers
//! `409 Conflict` with the location of the existing entry, which is fetched
//! and returned like a fresh one.

use crate::error::{Error, Result};
use crate::in_toto::dsse::Envelope;
use crate::signing::fulcio::SigningCertificate;
use crate::signing::verify_signature;
use crate::trust::TrustRoot;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ENTRIES_PATH: &str = "/api/v1/log/entries";
pub const INTOTO_KIND: &str = "intoto";
pub const INTOTO_API_VERSION: &str = "0.0.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedEntry {
    pub api_version: String,
    pub kind: String,
    pub spec: IntotoSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoSpec {
    pub content: IntotoContent,
    /// base64 of the PEM signing certificate.
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntotoContent {
    /// The DSSE envelope as a JSON string.
    pub envelope: String,
}

impl ProposedEntry {
    pub fn intoto(envelope: &Envelope, certificate: &SigningCertificate) -> Result<Self> {
        Ok(Self {
            api_version: INTOTO_API_VERSION.to_string(),
            kind: INTOTO_KIND.to_string(),
            spec: IntotoSpec {
                content: IntotoContent {
                    envelope: envelope.to_json_line()?,
                },
                public_key: STANDARD.encode(certificate.leaf_pem()?),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionProof {
    pub log_index: i64,
    pub root_hash: String,
    pub tree_size: i64,
    #[serde(default)]
    pub hashes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion_proof: Option<InclusionProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_entry_timestamp: Option<String>,
}

/// One log entry as the log returns it, keyed by UUID on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryBody {
    pub body: String,
    pub integrated_time: i64,
    #[serde(rename = "logID")]
    pub log_id: String,
    pub log_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
}

/// Inclusion receipt for a submitted envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub uuid: String,
    pub log_index: i64,
    pub log_id: String,
    pub integrated_time: i64,
    pub body: String,
    pub inclusion_proof: Option<InclusionProof>,
    pub signed_entry_timestamp: Option<String>,
}

impl LogEntry {
    pub fn from_parts(uuid: String, entry: LogEntryBody) -> Self {
        let (inclusion_proof, signed_entry_timestamp) = match entry.verification {
            Some(v) => (v.inclusion_proof, v.signed_entry_timestamp),
            None => (None, None),
        };

        Self {
            uuid,
            log_index: entry.log_index,
            log_id: entry.log_id,
            integrated_time: entry.integrated_time,
            body: entry.body,
            inclusion_proof,
            signed_entry_timestamp,
        }
    }

    /// Bytes covered by the signed entry timestamp: compact JSON with the
    /// keys in sorted order.
    pub fn signed_entry_payload(&self) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SetPayload<'a> {
            body: &'a str,
            integrated_time: i64,
            #[serde(rename = "logID")]
            log_id: &'a str,
            log_index: i64,
        }

        Ok(serde_json::to_vec(&SetPayload {
            body: &self.body,
            integrated_time: self.integrated_time,
            log_id: &self.log_id,
            log_index: self.log_index,
        })?)
    }
}

/// Parse a `{uuid: entry}` response holding exactly one entry.
pub fn parse_log_entry_response(body: &str) -> Result<LogEntry> {
    let entries: BTreeMap<String, LogEntryBody> = serde_json::from_str(body)
        .map_err(|e| Error::LogSubmission(format!("malformed log entry response: {e}")))?;

    let mut entries = entries.into_iter();
    match (entries.next(), entries.next()) {
        (Some((uuid, entry)), None) => Ok(LogEntry::from_parts(uuid, entry)),
        _ => Err(Error::LogSubmission(
            "expected exactly one entry in log response".to_string(),
        )),
    }
}

pub trait TransparencyLog {
    fn submit(&self, entry: &ProposedEntry) -> Result<LogEntry>;
}

pub struct RekorClient {
    client: Client,
    base_url: String,
}

impl RekorClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::LogSubmission(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    fn resolve_location(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}/{}", self.base_url, location.trim_start_matches('/'))
        }
    }

    fn fetch_existing(&self, location: &str) -> Result<LogEntry> {
        let url = self.resolve_location(location);
        log::info!("Entry already present in the transparency log, fetching {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::LogSubmission(format!("fetching {url}: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::LogSubmission(format!("reading {url}: {e}")))?;
        if !status.is_success() {
            return Err(Error::LogSubmission(format!(
                "fetching existing entry returned {status}: {}",
                text.trim()
            )));
        }

        parse_log_entry_response(&text)
    }
}

impl TransparencyLog for RekorClient {
    fn submit(&self, entry: &ProposedEntry) -> Result<LogEntry> {
        let url = format!("{}{}", self.base_url, ENTRIES_PATH);
        log::debug!("Submitting {} entry to {url}", entry.kind);

        let response = self
            .client
            .post(&url)
            .json(entry)
            .send()
            .map_err(|e| Error::LogSubmission(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::LogSubmission("409 Conflict without a Location header".to_string())
                })?;
            return self.fetch_existing(&location);
        }

        let text = response
            .text()
            .map_err(|e| Error::LogSubmission(format!("reading response: {e}")))?;
        if !status.is_success() {
            return Err(Error::LogSubmission(format!(
                "transparency log returned {status}: {}",
                text.trim()
            )));
        }

        parse_log_entry_response(&text)
    }
}

/// Submits signed envelopes and checks the receipts against the trust root.
pub struct TransparencyClient<'t> {
    log: Box<dyn TransparencyLog>,
    trust_root: &'t TrustRoot,
}

impl<'t> TransparencyClient<'t> {
    pub fn new(log: Box<dyn TransparencyLog>, trust_root: &'t TrustRoot) -> Self {
        Self { log, trust_root }
    }

    pub fn submit(&self, envelope: &Envelope, certificate: &SigningCertificate) -> Result<LogEntry> {
        let proposed = ProposedEntry::intoto(envelope, certificate)?;

        let entry = self.log.submit(&proposed).map_err(|e| match e {
            Error::LogSubmission(_) => e,
            other => Error::LogSubmission(other.to_string()),
        })?;

        self.verify_receipt(&entry)?;

        let integrated = chrono::DateTime::from_timestamp(entry.integrated_time, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| entry.integrated_time.to_string());
        log::info!(
            "Recorded in transparency log at index {} (uuid {}, integrated {integrated})",
            entry.log_index,
            entry.uuid
        );

        Ok(entry)
    }

    fn verify_receipt(&self, entry: &LogEntry) -> Result<()> {
        let Some(key) = self.trust_root.rekor_key() else {
            log::debug!("Trust root has no transparency log key, skipping receipt check");
            return Ok(());
        };

        if let Some(expected) = self.trust_root.rekor_log_id()? {
            if entry.log_id != expected {
                return Err(Error::LogSubmission(format!(
                    "entry was recorded by log {}, expected {expected}",
                    entry.log_id
                )));
            }
        }

        let set = entry.signed_entry_timestamp.as_deref().ok_or_else(|| {
            Error::LogSubmission("log entry carries no signed entry timestamp".to_string())
        })?;
        let signature = STANDARD
            .decode(set)
            .map_err(|e| Error::LogSubmission(format!("signed entry timestamp: {e}")))?;

        if !verify_signature(&entry.signed_entry_payload()?, &signature, key)? {
            return Err(Error::LogSubmission(
                "signed entry timestamp does not verify with the log key".to_string(),
            ));
        }

        Ok(())
    }
}
