//! Error types for omni-memory

use thiserror::Error;

/// Main error type for memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Embedding provider call failed (network, auth, rate limit, bad payload)
    #[error("Embedding provider error: {0}")]
    Provider(String),

    /// Record store call failed (connectivity, constraint violation, bad query)
    #[error("Storage error: {0}")]
    Store(String),

    /// Input violates a contract: empty content, dimension mismatch,
    /// unknown enum value, limit out of bounds
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MemoryError {
    /// Short machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::Provider(_) => "provider",
            MemoryError::Store(_) => "store",
            MemoryError::Validation(_) => "validation",
            MemoryError::Config(_) => "config",
            MemoryError::Io(_) => "io",
            MemoryError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Serialization(e.to_string())
    }
}

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_reason() {
        let err = MemoryError::Provider("401 Unauthorized".to_string());
        assert_eq!(err.to_string(), "Embedding provider error: 401 Unauthorized");

        let err = MemoryError::Validation("content must not be empty".to_string());
        assert!(err.to_string().contains("content must not be empty"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(MemoryError::Store("down".into()).kind(), "store");
        assert_eq!(MemoryError::Validation("bad".into()).kind(), "validation");
        assert_eq!(MemoryError::Provider("x".into()).kind(), "provider");
    }

    #[test]
    fn test_serde_json_error_converts() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: MemoryError = parse_err.into();
        assert_eq!(err.kind(), "serialization");
    }
}
