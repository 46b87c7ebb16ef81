//! # keyless-provenance
//!
//! Verifiable build provenance for Go binaries built in CI.
//!
//! The `build` subcommand runs `go build` in a restricted environment and
//! reports exactly what it ran. The `provenance` subcommand turns that
//! report into an in-toto statement with a SLSA v0.2 predicate, signs it
//! with a throwaway key certified for the workflow's OIDC identity, records
//! it in the public transparency log, and writes the signed envelope next
//! to the binary.
//!
//! ## Quick Start
//!
//! ```bash
//! keyless-provenance build --dry .slsa-goreleaser.yml "VERSION=1.2.3"
//! keyless-provenance build .slsa-goreleaser.yml "VERSION=1.2.3"
//! keyless-provenance provenance \
//!     --binary-name myapp \
//!     --digest 5f2c...e1 \
//!     --command '["go","build","-o","myapp"]' \
//!     --env '["GOOS=linux","GOARCH=amd64"]' \
//!     --workingDir /home/runner/work/myapp
//! ```

pub mod build;
pub mod cli;
pub mod error;
pub mod hash;
pub mod in_toto;
pub mod signing;
pub mod slsa;
pub mod storage;
#[cfg(test)]
mod tests;
pub mod trust;
pub mod utils;

use std::ffi::OsString;
use std::path::PathBuf;

// Re-export error types
pub use error::{Error, Result};

/// Process-level settings read from the environment at the CLI edge and
/// injected into the components.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory the build runs in and attestations are written to
    pub working_dir: PathBuf,
    /// Trust cache override (`TUF_ROOT`)
    pub tuf_root: Option<OsString>,
    /// Orchestrator output file (`GITHUB_OUTPUT`)
    pub github_output: Option<PathBuf>,
    /// Staging trust distribution point (`STAGING_TRUST_URL`)
    pub staging_trust_url: Option<String>,
    /// Staging bootstrap public key, PEM (`STAGING_TRUST_KEY`)
    pub staging_trust_key: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            working_dir: std::env::current_dir()?,
            tuf_root: std::env::var_os(trust::TUF_ROOT_VAR),
            github_output: std::env::var_os("GITHUB_OUTPUT")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            staging_trust_url: std::env::var(trust::STAGING_URL_VAR)
                .ok()
                .filter(|v| !v.is_empty()),
            staging_trust_key: std::env::var_os(trust::STAGING_KEY_VAR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Initialize logging for the CLI
///
/// The level comes from `RUST_LOG`.
///
/// # Examples
///
/// ```
/// use keyless_provenance::init_logging;
///
/// // Fails harmlessly if a logger is already installed
/// let result = init_logging();
/// assert!(result.is_ok() || result.is_err());
/// ```
pub fn init_logging() -> Result<()> {
    env_logger::try_init().map_err(|e| Error::InitializationError(e.to_string()))
}
