//! Dispatcher error types

use contracts::SinkType;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A configured sink could not be created; no worker is left running
    #[error("failed to create {sink_type:?} sink '{name}': {message}")]
    SinkCreation {
        name: String,
        sink_type: SinkType,
        message: String,
    },
}

impl DispatcherError {
    pub fn sink_creation(
        name: impl Into<String>,
        sink_type: SinkType,
        message: impl Into<String>,
    ) -> Self {
        Self::SinkCreation {
            name: name.into(),
            sink_type,
            message: message.into(),
        }
    }

    /// Name of the sink that failed
    pub fn sink_name(&self) -> &str {
        match self {
            Self::SinkCreation { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names_sink_and_type() {
        let err = DispatcherError::sink_creation("net", SinkType::Network, "missing 'addr'");
        assert_eq!(
            err.to_string(),
            "failed to create Network sink 'net': missing 'addr'"
        );
        assert_eq!(err.sink_name(), "net");
    }
}
