//! Error types for Omnicast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmnicastError>;

#[derive(Error, Debug)]
pub enum OmnicastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Session codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("OAuth state not found (already used or never issued)")]
    StateNotFound,

    #[error("OAuth state expired")]
    StateExpired,

    #[error("No eligible accounts among the requested targets")]
    NoEligibleAccounts,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl OmnicastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            OmnicastError::InvalidInput(_) => 3,
            OmnicastError::Platform(PlatformError::InvalidCredentials(_))
            | OmnicastError::Platform(PlatformError::VerificationRequired(_))
            | OmnicastError::Platform(PlatformError::SessionExpired(_)) => 2,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Platform {0} is not configured")]
    PlatformNotConfigured(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Post not found: {0}")]
    PostNotFound(String),
}

/// Adapter-level error taxonomy
///
/// Every platform adapter maps its native failures onto these variants so
/// the connector and publisher can treat all platforms uniformly. The
/// variants are surfaced unchanged up the stack.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Verification required: {0}")]
    VerificationRequired(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Automation worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Platform error: {0}")]
    Unknown(String),
}

impl PlatformError {
    /// Transient errors are eligible for a single automatic retry at the
    /// adapter-call boundary. Everything else is permanent for that call.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Network(_))
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encrypt session: {0}")]
    Encrypt(String),

    #[error("Corrupt session blob: {0}")]
    Corrupt(String),

    #[error("Session passphrase not configured")]
    MissingPassphrase,
}
