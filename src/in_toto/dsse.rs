//! Dead Simple Signing Envelope.
//!
//! Signatures cover the pre-authentication encoding of the payload type and
//! payload, never the payload alone.

use crate::error::{Error, Result};
use crate::signing::fulcio::SigningCertificate;
use crate::signing::signable::Signable;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    keyid: String,
    #[serde_as(as = "serde_with::base64::Base64")]
    sig: Vec<u8>,
    /// PEM signing certificate the signature verifies against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cert: Option<String>,
}

impl Signature {
    fn new(sig: Vec<u8>, keyid: String, cert: Option<String>) -> Self {
        Self { keyid, sig, cert }
    }

    pub fn keyid(&self) -> &str {
        &self.keyid
    }

    pub fn sig(&self) -> &[u8] {
        &self.sig
    }

    pub fn cert(&self) -> Option<&str> {
        self.cert.as_deref()
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    payload_type: String,
    #[serde_as(as = "serde_with::base64::Base64")]
    payload: Vec<u8>,
    signatures: Vec<Signature>,
}

impl Envelope {
    pub fn new(payload: &[u8], payload_type: &str) -> Self {
        Self {
            payload_type: payload_type.to_string(),
            payload: payload.to_vec(),
            signatures: vec![],
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_type(&self) -> &str {
        &self.payload_type
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// `PAE(payloadType, payload)`, the bytes every signature is computed over.
    pub fn pae(&self) -> Vec<u8> {
        pae(&self.payload_type, &self.payload)
    }

    pub fn add_signature(&mut self, sig: Vec<u8>, keyid: String, cert: Option<String>) -> Result<()> {
        if sig.is_empty() {
            return Err(Error::Signing("DSSE signature cannot be empty".to_string()));
        }

        self.signatures.push(Signature::new(sig, keyid, cert));

        Ok(())
    }

    pub fn validate(&self) -> bool {
        if self.payload.is_empty() || self.payload_type.is_empty() || self.signatures.is_empty() {
            return false;
        }

        self.signatures.iter().all(|s| !s.sig.is_empty())
    }

    /// Single-line JSON, the `.intoto.jsonl` record format.
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Signable for Envelope {
    fn signing_input(&self) -> Vec<u8> {
        self.pae()
    }

    fn attach_signature(
        &mut self,
        signature: Vec<u8>,
        certificate: &SigningCertificate,
    ) -> Result<()> {
        // keyless signatures are identified by their certificate, not a key id
        self.add_signature(signature, String::new(), Some(certificate.leaf_pem()?))
    }
}

/// DSSE v1 pre-authentication encoding.
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );
    let mut result = Vec::with_capacity(header.len() + payload.len());
    result.extend_from_slice(header.as_bytes());
    result.extend_from_slice(payload);
    result
}
