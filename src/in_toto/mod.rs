//! # in-toto Statements
//!
//! Generic in-toto v0.1 statement layout and the DSSE envelope used to sign
//! it. Statements serialize with a fixed field order
//! (`_type`, `predicateType`, `subject`, `predicate`) and digest sets are
//! ordered maps, so the JSON produced for a given statement is always the
//! same byte sequence.
//!
//! ## Examples
//!
//! ```
//! use keyless_provenance::hash::{ArtifactDigest, DigestAlgorithm};
//! use keyless_provenance::in_toto::make_subject;
//!
//! let digest = ArtifactDigest::of_bytes(b"binary", DigestAlgorithm::Sha256);
//! let subject = make_subject("myapp", &digest);
//!
//! assert_eq!(subject.name, "myapp");
//! assert_eq!(subject.digest.get("sha256").map(String::as_str), Some(digest.hex()));
//! ```

use crate::error::{Error, Result};
use crate::hash::ArtifactDigest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod dsse;

pub const DSSE_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";
pub const STATEMENT_TYPE_V01: &str = "https://in-toto.io/Statement/v0.1";

/// Artifact named by a statement together with its digest set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub digest: BTreeMap<String, String>,
}

pub fn make_subject(name: &str, digest: &ArtifactDigest) -> Subject {
    Subject {
        name: name.to_string(),
        digest: BTreeMap::from([(
            digest.algorithm().as_str().to_string(),
            digest.hex().to_string(),
        )]),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement<P> {
    #[serde(rename = "_type")]
    pub statement_type: String,
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    pub subject: Vec<Subject>,
    pub predicate: P,
}

impl<P: Serialize> Statement<P> {
    pub fn new_v01(subject: Vec<Subject>, predicate_type: &str, predicate: P) -> Self {
        Self {
            statement_type: STATEMENT_TYPE_V01.to_string(),
            predicate_type: predicate_type.to_string(),
            subject,
            predicate,
        }
    }

    /// Compact JSON in declaration order. This is the byte sequence that
    /// gets signed.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize in-toto statement: {e}")))
    }
}
