//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Frame source could not be opened
    #[error("Failed to open frame source '{source_id}': {message}")]
    SourceOpen { source_id: String, message: String },

    /// Processor lifecycle error
    #[error("Depth processor error: {0}")]
    Processor(#[from] depth_processor::ProcessorError),

    /// Dispatcher setup error
    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn source_open(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceOpen {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CliError::config_not_found("missing.toml");
        assert_eq!(err.to_string(), "Configuration file not found: missing.toml");

        let err = CliError::source_open("kinect0", "no recording");
        assert!(err.to_string().contains("'kinect0'"));
    }
}
