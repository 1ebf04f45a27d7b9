use thiserror::Error;

/// Errors raised while assembling the runtime a playback engine runs on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A default capability exists but could not be constructed.
    #[error("Failed to initialize {capability}: {message}")]
    CapabilityInit { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
