pub mod commands;
pub mod handlers;
use crate::error::Error;

pub use commands::{BuildArgs, ProvenanceArgs};
pub use handlers::{handle_build_command, handle_provenance_command};

pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CLI_NAME: &str = "keyless-provenance";

pub fn usage() -> String {
    format!(
        "Usage:\n  \
         {CLI_NAME} build [--dry] <configPath> <envAssignments>\n  \
         {CLI_NAME} provenance --binary-name <name> --digest <sha256hex> --command <cmd> \
         --env <envAssignments> --workingDir <dir> [--staging]\n"
    )
}

pub fn format_error(error: &Error) -> String {
    match error {
        Error::Configuration(msg) => format!("Configuration error: {msg}"),
        Error::ToolNotFound(msg) => format!("Build tool not found: {msg}"),
        Error::BuildExecution(msg) => format!("Build failed: {msg}"),
        Error::Environment(msg) => format!("Environment error: {msg}"),
        Error::CertificateIssuance(msg) => format!("Certificate issuance failed: {msg}"),
        Error::TrustInitialization(msg) => format!("Trust root initialization failed: {msg}"),
        Error::LogSubmission(msg) => format!("Transparency log submission failed: {msg}"),
        Error::Io(err) => format!("IO error: {err}"),
        Error::Signing(msg) => format!("Signing error: {msg}"),
        Error::Serialization(msg) => format!("Serialization error: {msg}"),
        Error::Json(err) => format!("JSON error: {err}"),
        Error::Yaml(err) => format!("YAML error: {err}"),
        Error::HexDecode(err) => format!("Hex decode error: {err}"),
        Error::InitializationError(msg) => format!("Initialization error: {msg}"),
    }
}
