use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Build tool not found: {0}")]
    ToolNotFound(String),

    #[error("Build execution failed: {0}")]
    BuildExecution(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Certificate issuance failed: {0}")]
    CertificateIssuance(String),

    #[error("Trust root initialization failed: {0}")]
    TrustInitialization(String),

    #[error("Transparency log submission failed: {0}")]
    LogSubmission(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Initialization error: {0}")]
    InitializationError(String),
}
