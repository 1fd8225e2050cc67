//! Error types for the `realtime` crate.
//!
//! Follows the same layered pattern as the rest of the workspace: a root Error
//! struct holding an error kind and an optional source for chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the realtime crate.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the upstream change-feed integration.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Missing or unusable project URL / key.
    Config,
    /// The upstream rejected the supplied credentials.
    Authentication,
    /// Transport-level failure talking to the upstream.
    Connection,
    /// A frame that does not follow the channel protocol.
    Protocol,
    /// Joining the channel failed or no subscription exists yet.
    Subscription,
    /// A single change notification could not be normalized.
    Notification(NotificationErrorKind),
}

/// Reasons a single notification is rejected.
#[derive(Debug, PartialEq)]
pub enum NotificationErrorKind {
    Malformed,
    UnknownOperation,
    InvalidTimestamp,
}

impl Error {
    /// Whether the error should abort process startup rather than be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Config | ErrorKind::Authentication
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let detail = self
            .source
            .as_ref()
            .map(|e| format!(": {e}"))
            .unwrap_or_default();
        match &self.error_kind {
            ErrorKind::Config => write!(f, "Realtime configuration error{detail}"),
            ErrorKind::Authentication => write!(f, "Realtime authentication failed{detail}"),
            ErrorKind::Connection => write!(f, "Realtime connection error{detail}"),
            ErrorKind::Protocol => write!(f, "Realtime protocol error{detail}"),
            ErrorKind::Subscription => write!(f, "Realtime subscription error{detail}"),
            ErrorKind::Notification(kind) => {
                write!(f, "Notification rejected ({kind:?}){detail}")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        let error_kind = match &err {
            WsError::Http(response)
                if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
            {
                ErrorKind::Authentication
            }
            WsError::Url(_) => ErrorKind::Config,
            WsError::Protocol(_) => ErrorKind::Protocol,
            _ => ErrorKind::Connection,
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Config,
        }
    }
}

/// Helper function to create configuration errors.
pub fn config_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Config,
    }
}

/// Helper function to create subscription errors.
pub fn subscription_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Subscription,
    }
}

/// Helper function to create connection errors.
pub fn connection_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Connection,
    }
}

/// Helper function to create notification errors.
pub fn notification_error(kind: NotificationErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Notification(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_problems_are_fatal() {
        assert!(config_error("missing key").is_fatal());
        assert!(Error {
            source: None,
            error_kind: ErrorKind::Authentication
        }
        .is_fatal());
        assert!(!connection_error("reset by peer").is_fatal());
        assert!(!notification_error(NotificationErrorKind::Malformed, "bad").is_fatal());
    }

    #[test]
    fn display_includes_source_detail() {
        let err = notification_error(NotificationErrorKind::UnknownOperation, "TRUNCATE");
        assert_eq!(
            err.to_string(),
            "Notification rejected (UnknownOperation): TRUNCATE"
        );
    }
}
