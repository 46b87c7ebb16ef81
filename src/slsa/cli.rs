use crate::error::{Error, Result};
use crate::hash::{ArtifactDigest, DigestAlgorithm};
use crate::signing::keyless::KeylessSigner;
use crate::slsa::generators::generate_provenance_v02;
use crate::slsa::statement::{Command, Environment, WorkingDir};
use crate::storage::filesystem::{AttestationWriter, WrittenAttestation, attestation_file_name};
use crate::storage::rekor::{LogEntry, TransparencyClient};
use std::io::Write;

/// Literal inputs of one `provenance` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceRequest {
    pub binary_name: String,
    pub digest: String,
    pub command: String,
    pub env: String,
    pub working_dir: String,
}

impl ProvenanceRequest {
    /// Names of required flags that were left empty. `--env` may be empty.
    pub fn missing_flags(&self) -> Vec<&'static str> {
        [
            ("--binary-name", &self.binary_name),
            ("--digest", &self.digest),
            ("--command", &self.command),
            ("--workingDir", &self.working_dir),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(flag, _)| flag)
        .collect()
    }

    /// Check everything that can be checked offline and return the parsed
    /// subject digest.
    pub fn validate(&self) -> Result<ArtifactDigest> {
        let missing = self.missing_flags();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "missing required flag(s): {}",
                missing.join(", ")
            )));
        }
        attestation_file_name(&self.binary_name)?;
        ArtifactDigest::from_hex(DigestAlgorithm::Sha256, &self.digest)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct SignedProvenance {
    pub attestation: WrittenAttestation,
    pub log_entry: LogEntry,
}

/// Build, sign, publish and persist provenance for one artifact.
///
/// Stages run strictly in order and the first failure ends the run. The
/// attestation file is written, and outputs emitted, only after the
/// transparency log accepted the entry.
pub fn generate_signed_provenance(
    request: &ProvenanceRequest,
    signer: &KeylessSigner<'_>,
    transparency: &TransparencyClient<'_>,
    writer: &AttestationWriter,
    out: &mut dyn Write,
) -> Result<SignedProvenance> {
    let digest = request.validate()?;

    let statement = generate_provenance_v02(
        &request.binary_name,
        &digest,
        Command::new(&request.command),
        Environment::new(&request.env),
        WorkingDir::new(&request.working_dir),
    );
    log::debug!(
        "Provenance statement for {} ({})",
        statement.subject_name(),
        statement.subject_digest()
    );

    let signed = signer.sign(&statement)?;
    let log_entry = transparency.submit(&signed.envelope, &signed.certificate)?;

    let attestation = writer.write(&request.binary_name, &signed.envelope)?;
    writer.emit_outputs(&attestation, out)?;

    Ok(SignedProvenance {
        attestation,
        log_entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProvenanceRequest {
        ProvenanceRequest {
            binary_name: "myapp".to_string(),
            digest: "ab".repeat(32),
            command: r#"["go","build"]"#.to_string(),
            env: String::new(),
            working_dir: "/src".to_string(),
        }
    }

    #[test]
    fn test_env_may_be_empty() -> Result<()> {
        let digest = request().validate()?;
        assert_eq!(digest.hex(), "ab".repeat(32));
        Ok(())
    }

    #[test]
    fn test_missing_flags() {
        let mut req = request();
        req.digest.clear();
        req.working_dir.clear();
        assert_eq!(req.missing_flags(), vec!["--digest", "--workingDir"]);
        assert!(matches!(req.validate(), Err(Error::Configuration(_))));

        assert_eq!(ProvenanceRequest::default().missing_flags().len(), 4);
    }

    #[test]
    fn test_rejects_bad_digest_and_name() {
        let mut short = request();
        short.digest = "abc".to_string();
        assert!(matches!(short.validate(), Err(Error::Configuration(_))));

        let mut path = request();
        path.binary_name = "../myapp".to_string();
        assert!(matches!(path.validate(), Err(Error::Configuration(_))));
    }
}
