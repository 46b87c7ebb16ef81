//! # SLSA Build Provenance
//!
//! Generation of SLSA v0.2 build provenance for artifacts produced by the
//! `build` subcommand, and the end-to-end signing pipeline that publishes it.
//!
//! SLSA provenance provides a cryptographically verifiable record of:
//! - What software was built (the subject name and digest)
//! - How it was built (the literal command, environment and working directory)
//! - Who built it (the fixed builder identity of this tool)
//!
//! ## Key Components
//!
//! - [`generators`] - Constructors for the provenance predicate and statement
//! - [`statement`] - The immutable [`statement::ProvenanceStatement`] and its
//!   opaque invocation fields
//! - [`cli`] - The `provenance` subcommand pipeline: sign, publish, persist
//!
//! ## Examples
//!
//! ```
//! use keyless_provenance::hash::{ArtifactDigest, DigestAlgorithm};
//! use keyless_provenance::slsa::generators::generate_provenance_v02;
//! use keyless_provenance::slsa::statement::{Command, Environment, WorkingDir};
//!
//! let digest = ArtifactDigest::from_hex(DigestAlgorithm::Sha256, &"a".repeat(64)).unwrap();
//! let statement = generate_provenance_v02(
//!     "myapp",
//!     &digest,
//!     Command::new("go build -o myapp"),
//!     Environment::new(""),
//!     WorkingDir::new("/src"),
//! );
//!
//! assert_eq!(statement.canonical_bytes().unwrap(), statement.canonical_bytes().unwrap());
//! ```

pub mod cli;
pub mod generators;
pub mod statement;

/// The SLSA v0.2 build provenance in-toto predicate type URI.
///
/// ```
/// use keyless_provenance::slsa::BUILD_PROVENANCE_PREDICATE_TYPE_V02;
///
/// assert_eq!(BUILD_PROVENANCE_PREDICATE_TYPE_V02, "https://slsa.dev/provenance/v0.2");
/// ```
pub const BUILD_PROVENANCE_PREDICATE_TYPE_V02: &str = "https://slsa.dev/provenance/v0.2";
