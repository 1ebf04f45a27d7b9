use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Chunk source returned HTTP {status} for {locator}")]
    HttpStatus { status: u16, locator: String },

    #[error("Invalid media data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` when repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            BridgeError::OperationFailed(_) | BridgeError::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let server = BridgeError::HttpStatus {
            status: 503,
            locator: "https://cdn.example/chunk-0".to_string(),
        };
        let throttled = BridgeError::HttpStatus {
            status: 429,
            locator: "https://cdn.example/chunk-0".to_string(),
        };
        let missing = BridgeError::HttpStatus {
            status: 404,
            locator: "https://cdn.example/chunk-0".to_string(),
        };

        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!BridgeError::InvalidData("truncated frame".into()).is_retryable());
    }
}
