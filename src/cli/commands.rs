use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// Resolve and print the invocation without running the build
    #[arg(long = "dry")]
    pub dry: bool,

    /// Path to the YAML build configuration
    #[arg(value_name = "CONFIG_PATH")]
    pub config_path: PathBuf,

    /// Comma-separated NAME=VALUE assignments used to resolve placeholders
    #[arg(value_name = "ENV_ASSIGNMENTS", default_value = "")]
    pub env_assignments: String,
}

/// Required values are checked by the handler rather than clap so that an
/// empty value gets the usage text and exit status 1, same as a missing one.
#[derive(Debug, Clone, Args)]
pub struct ProvenanceArgs {
    /// File name of the built artifact
    #[arg(long = "binary-name", default_value = "")]
    pub binary_name: String,

    /// SHA-256 hex digest of the built artifact
    #[arg(long = "digest", default_value = "")]
    pub digest: String,

    /// Build command, recorded verbatim
    #[arg(long = "command", default_value = "")]
    pub command: String,

    /// Build environment, recorded verbatim (may be empty)
    #[arg(long = "env", default_value = "")]
    pub env: String,

    /// Build working directory, recorded verbatim
    #[arg(long = "workingDir", default_value = "")]
    pub working_dir: String,

    /// Use the staging certificate authority and transparency log
    /// (needs STAGING_TRUST_URL and STAGING_TRUST_KEY)
    #[arg(long = "staging")]
    pub staging: bool,
}
