use crate::error::Result;
use crate::hash::{ArtifactDigest, DigestAlgorithm};
use crate::in_toto::dsse::Envelope;
use crate::utils::{ensure_plain_file_name, safe_append_file, safe_create_file};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ATTESTATION_SUFFIX: &str = ".intoto.jsonl";
pub const OUTPUT_NAME_KEY: &str = "signed-provenance-name";
pub const OUTPUT_DIGEST_KEY: &str = "signed-provenance-sha256";

/// A persisted attestation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenAttestation {
    pub file_name: String,
    pub path: PathBuf,
    pub digest: ArtifactDigest,
}

impl WrittenAttestation {
    /// `key=value` lines handed to the calling workflow.
    pub fn output_lines(&self) -> Vec<String> {
        vec![
            format!("{OUTPUT_NAME_KEY}={}", self.file_name),
            format!("{OUTPUT_DIGEST_KEY}={}", self.digest.hex()),
        ]
    }
}

pub fn attestation_file_name(subject_name: &str) -> Result<String> {
    ensure_plain_file_name(subject_name)?;
    Ok(format!("{subject_name}{ATTESTATION_SUFFIX}"))
}

/// Persists envelopes and reports them to the caller.
#[derive(Debug, Clone)]
pub struct AttestationWriter {
    output_dir: PathBuf,
    github_output: Option<PathBuf>,
}

impl AttestationWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            github_output: None,
        }
    }

    /// Also append output lines to this file (the `GITHUB_OUTPUT` protocol).
    pub fn with_github_output(mut self, path: Option<PathBuf>) -> Self {
        self.github_output = path.filter(|p| !p.as_os_str().is_empty());
        self
    }

    /// Write `<subject>.intoto.jsonl` atomically: the envelope goes to a
    /// temporary file in the same directory which is then renamed over the
    /// destination.
    pub fn write(&self, subject_name: &str, envelope: &Envelope) -> Result<WrittenAttestation> {
        let file_name = attestation_file_name(subject_name)?;
        let path = self.output_dir.join(&file_name);
        let tmp_path = self
            .output_dir
            .join(format!(".{file_name}.{}.tmp", std::process::id()));

        let mut line = envelope.to_json_line()?;
        line.push('\n');

        if let Err(e) = write_restricted(&tmp_path, line.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        let digest = ArtifactDigest::of_bytes(line.as_bytes(), DigestAlgorithm::Sha256);
        log::info!("Wrote attestation {} ({digest})", path.display());

        Ok(WrittenAttestation {
            file_name,
            path,
            digest,
        })
    }

    /// Emit the output lines to `out` and, when configured, the
    /// `GITHUB_OUTPUT` file.
    pub fn emit_outputs(&self, written: &WrittenAttestation, out: &mut dyn Write) -> Result<()> {
        emit_lines(&written.output_lines(), out, self.github_output.as_deref())
    }
}

/// Write `lines` to `out`, and append them to `github_output` if given.
pub fn emit_lines(lines: &[String], out: &mut dyn Write, github_output: Option<&Path>) -> Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;

    if let Some(path) = github_output {
        let mut file = safe_append_file(path)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        log::debug!("Appended {} output(s) to {}", lines.len(), path.display());
    }

    Ok(())
}

fn write_restricted(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = safe_create_file(path, true)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
