//! Protocol-level errors.
//!
//! Rounds themselves never fail: protocol failures degrade into timeouts.
//! These variants cover construction and configuration problems only.

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("device {id} already exists")]
    DuplicateDevice { id: u32 },

    #[error("unknown device: {id}")]
    UnknownDevice { id: u32 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl ProtocolError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ProtocolError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ProtocolError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Deserialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_config() {
        let err = ProtocolError::invalid("period must be positive");
        assert_eq!(
            err.to_string(),
            "invalid configuration: period must be positive"
        );
    }

    #[test]
    fn test_display_duplicate_device() {
        let err = ProtocolError::DuplicateDevice { id: 4 };
        assert_eq!(err.to_string(), "device 4 already exists");
    }

    #[test]
    fn test_display_unknown_device() {
        let err = ProtocolError::UnknownDevice { id: 9 };
        assert_eq!(err.to_string(), "unknown device: 9");
    }

    #[test]
    fn test_from_json_error() {
        let parse = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: ProtocolError = parse.into();
        assert!(err.to_string().starts_with("deserialization error:"));
    }
}
