use thiserror::Error;

/// Failures reported by the platform session broker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The app is not an enabled notification/media listener
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("platform error: {0}")]
    Platform(String),
}

impl SessionError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SessionError::PermissionDenied(_))
    }
}

/// Failures from a provider's remote-control SDK handshake
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("authorization required: {0}")]
    Authorization(String),

    #[error("remote connection failed: {0}")]
    Connection(String),
}

impl RemoteError {
    /// Whether the user has to re-authorize before the handshake can succeed.
    ///
    /// SDKs do not always type their failures, so a connection error whose
    /// message mentions authorization counts too.
    pub fn is_authorization(&self) -> bool {
        match self {
            RemoteError::Authorization(_) => true,
            RemoteError::Connection(message) => message.to_lowercase().contains("authorization"),
        }
    }
}
