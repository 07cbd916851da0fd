use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Wrong password, or a payload that was mangled on the way.
    #[error("wrong password or corrupted payload")]
    Decrypt { reason: &'static str },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("device session not started")]
    NotStarted,

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_response() -> Self {
        Error::Protocol("invalid response".to_string())
    }

    /// Whether the next poll tick has a chance of succeeding where this one failed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Connection(_) => true,
            Error::Http { .. } => true, // until it recurs
            Error::Io(_) => true,
            Error::NotStarted => true,

            Error::Decrypt { .. } => false, // a wrong password stays wrong
            Error::Protocol(_) => false,
            Error::Mqtt(_) => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(format!("JSON parse error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_transient());
        assert!(Error::Connection("refused".to_string()).is_transient());
        assert!(Error::Http {
            status: 503,
            body: "busy".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_configuration_errors_are_not_transient() {
        assert!(!Error::Decrypt { reason: "bad padding" }.is_transient());
        assert!(!Error::invalid_response().is_transient());
    }

    #[test]
    fn test_decrypt_message_hides_reason() {
        let err = Error::Decrypt { reason: "bad padding" };
        assert_eq!(err.to_string(), "wrong password or corrupted payload");
    }

    #[test]
    fn test_json_error_becomes_protocol_error() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
