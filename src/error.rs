//! Error types for the intake bot.

use std::time::Duration;

use crate::registration::Step;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download file on channel {name}: {reason}")]
    DownloadFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Document field extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extraction credential is not configured")]
    MissingApiKey,

    #[error("File does not exist: {0}")]
    FileNotFound(String),

    #[error("Endpoint {endpoint} request failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Endpoint {endpoint} job {job_id} failed")]
    JobFailed { endpoint: String, job_id: String },

    #[error("Endpoint {endpoint} job {job_id} not finished after {attempts} polls")]
    PollExhausted {
        endpoint: String,
        job_id: String,
        attempts: u32,
    },

    #[error("Invalid response from endpoint {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Refusing to store an empty blob")]
    Empty,

    #[error("Path {0} is outside the blob store")]
    OutsideStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registration progress errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("No registration in progress for user {user_id}")]
    NotFound { user_id: i64 },

    #[error("Step {step} has no successor")]
    TerminalStep { step: Step },

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: Step, to: Step },
}

/// Photo intake failures. The step is not advanced; the user uploads again.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Step {step} does not accept documents")]
    NotUploadStep { step: Step },

    #[error("No data could be read from the {step} document")]
    NoData { step: Step },

    #[error("Step moved away from {expected} during extraction")]
    StepChanged { expected: Step },

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
