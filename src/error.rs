use thiserror::Error;

/// Failure reported by a push backend implementation.
///
/// `code` follows the `service/reason` convention used by the messaging SDK
/// (`app/duplicate-app`, `messaging/invalid-vapid-key`, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: String,
    pub message: String,
}

impl BackendError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        BackendError {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("Firebase Messaging is not supported in this browser")]
    UnsupportedEnvironment,

    #[error("VAPID key is not configured")]
    MissingVapidKey,

    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("push backend failure: {0}")]
    BackendFailure(#[from] BackendError),
}

pub type MessagingResult<T> = Result<T, MessagingError>;
