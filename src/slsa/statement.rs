//! The provenance statement and its opaque invocation fields.

use crate::error::{Error, Result};
use crate::hash::{ArtifactDigest, DigestAlgorithm};
use crate::in_toto::{Statement, Subject};
use serde::{Deserialize, Serialize};

macro_rules! opaque_field {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_field!(
    /// The command exactly as it was run, recorded verbatim.
    Command
);
opaque_field!(
    /// The environment assignments exactly as supplied, recorded verbatim.
    Environment
);
opaque_field!(
    /// The working directory exactly as supplied, recorded verbatim.
    WorkingDir
);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Builder {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub command: Command,
    pub environment: Environment,
    #[serde(rename = "workingDir")]
    pub working_dir: WorkingDir,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenancePredicate {
    pub builder: Builder,
    #[serde(rename = "buildType")]
    pub build_type: String,
    pub invocation: Invocation,
}

/// A single-subject SLSA provenance statement.
///
/// There are no mutators: once built, the statement and therefore its
/// canonical bytes never change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenanceStatement {
    inner: Statement<ProvenancePredicate>,
    digest: ArtifactDigest,
}

impl ProvenanceStatement {
    pub(crate) fn new(inner: Statement<ProvenancePredicate>, digest: ArtifactDigest) -> Self {
        Self { inner, digest }
    }

    /// Rebuild a statement from signed payload bytes.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self> {
        let inner: Statement<ProvenancePredicate> = serde_json::from_slice(bytes)?;
        let subject = match inner.subject.as_slice() {
            [subject] => subject,
            _ => {
                return Err(Error::Serialization(
                    "provenance statement must have exactly one subject".to_string(),
                ));
            }
        };
        let (alg, hex) = subject.digest.iter().next().ok_or_else(|| {
            Error::Serialization("provenance subject has no digest".to_string())
        })?;
        let digest = ArtifactDigest::from_hex(alg.parse::<DigestAlgorithm>()?, hex)?;
        Ok(Self { inner, digest })
    }

    pub fn subject(&self) -> &Subject {
        &self.inner.subject[0]
    }

    pub fn subject_name(&self) -> &str {
        &self.subject().name
    }

    pub fn subject_digest(&self) -> &ArtifactDigest {
        &self.digest
    }

    pub fn predicate_type(&self) -> &str {
        &self.inner.predicate_type
    }

    pub fn predicate(&self) -> &ProvenancePredicate {
        &self.inner.predicate
    }

    /// Deterministic serialization: identical statements always produce
    /// identical bytes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        self.inner.to_canonical_json()
    }
}
