//! # Hash Module
//!
//! Digest computation for built artifacts and written attestations.
//!
//! The pipeline records artifacts by SHA-256, which is what the `provenance`
//! subcommand accepts on its command line and what the emitted
//! `signed-provenance-sha256` output carries. SHA-384 and SHA-512 are
//! available for callers that hash other material.
//!
//! ## Examples
//!
//! ```
//! use keyless_provenance::hash::{ArtifactDigest, DigestAlgorithm};
//!
//! let digest = ArtifactDigest::of_bytes(b"binary", DigestAlgorithm::Sha256);
//! assert_eq!(digest.hex().len(), 64);
//! assert_eq!(digest.algorithm().as_str(), "sha256");
//! ```

use crate::error::{Error, Result};
use crate::utils::safe_open_file;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Hash algorithms understood by the digest helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Name used as the key of an in-toto digest set.
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the lowercase hex encoding of a digest.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha384 => 96,
            DigestAlgorithm::Sha512 => 128,
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            other => Err(Error::Configuration(format!(
                "unsupported digest algorithm '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Algorithm tag plus lowercase hex digest of an artifact.
///
/// Values are immutable once constructed. Parsing user input through
/// [`ArtifactDigest::from_hex`] guarantees the hex is well formed and has the
/// length the algorithm produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactDigest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl ArtifactDigest {
    /// Validate and wrap an externally supplied digest.
    ///
    /// ```
    /// use keyless_provenance::hash::{ArtifactDigest, DigestAlgorithm};
    ///
    /// let ok = ArtifactDigest::from_hex(DigestAlgorithm::Sha256, &"AB".repeat(32)).unwrap();
    /// assert_eq!(ok.hex(), "ab".repeat(32));
    ///
    /// assert!(ArtifactDigest::from_hex(DigestAlgorithm::Sha256, "abc").is_err());
    /// assert!(ArtifactDigest::from_hex(DigestAlgorithm::Sha256, &"zz".repeat(32)).is_err());
    /// ```
    pub fn from_hex(algorithm: DigestAlgorithm, hex_digest: &str) -> Result<Self> {
        let hex_digest = hex_digest.trim();
        if hex_digest.len() != algorithm.hex_len() {
            return Err(Error::Configuration(format!(
                "{algorithm} digest must be {} hex characters, got {}",
                algorithm.hex_len(),
                hex_digest.len()
            )));
        }
        hex::decode(hex_digest).map_err(|e| {
            Error::Configuration(format!("{algorithm} digest is not valid hex: {e}"))
        })?;

        Ok(Self {
            algorithm,
            hex: hex_digest.to_ascii_lowercase(),
        })
    }

    pub fn of_bytes(data: &[u8], algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            hex: calculate_hash_with_algorithm(data, &algorithm),
        }
    }

    pub fn of_file(path: impl AsRef<Path>, algorithm: DigestAlgorithm) -> Result<Self> {
        Ok(Self {
            algorithm,
            hex: calculate_file_hash_with_algorithm(path, &algorithm)?,
        })
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Constant-time comparison against another hex digest string.
    pub fn matches_hex(&self, other: &str) -> bool {
        let other = other.to_ascii_lowercase();
        if other.len() != self.hex.len() {
            return false;
        }
        self.hex.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl fmt::Display for ArtifactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Calculate the hex digest of `data` with the specified algorithm.
///
/// ```
/// use keyless_provenance::hash::{calculate_hash_with_algorithm, DigestAlgorithm};
///
/// let hash256 = calculate_hash_with_algorithm(b"Hello, World!", &DigestAlgorithm::Sha256);
/// assert_eq!(hash256.len(), 64);
///
/// let hash512 = calculate_hash_with_algorithm(b"Hello, World!", &DigestAlgorithm::Sha512);
/// assert_eq!(hash512.len(), 128);
/// ```
pub fn calculate_hash_with_algorithm(data: &[u8], algorithm: &DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        DigestAlgorithm::Sha384 => hex::encode(Sha384::digest(data)),
        DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
    }
}

/// Calculate the SHA-256 digest of a file.
pub fn calculate_file_hash(path: impl AsRef<Path>) -> Result<String> {
    calculate_file_hash_with_algorithm(path, &DigestAlgorithm::Sha256)
}

/// Calculate the digest of a file, streaming it in chunks.
///
/// Symlinks are refused so a build cannot redirect the recorded digest to a
/// file outside the working tree.
pub fn calculate_file_hash_with_algorithm(
    path: impl AsRef<Path>,
    algorithm: &DigestAlgorithm,
) -> Result<String> {
    let file = safe_open_file(path.as_ref(), false)?;

    match algorithm {
        DigestAlgorithm::Sha256 => hash_reader::<Sha256, _>(file),
        DigestAlgorithm::Sha384 => hash_reader::<Sha384, _>(file),
        DigestAlgorithm::Sha512 => hash_reader::<Sha512, _>(file),
    }
}

fn hash_reader<D: Digest, R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
