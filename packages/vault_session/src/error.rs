#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Vault authentication failed: {0}")]
    Unauthorized(String),
    #[error("Permission denied: {0}")]
    Forbidden(String),
    #[error("Path not found: {0}")]
    PathNotFound(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Vault internal error: {0}")]
    Internal(String),
    #[error("Vault is not initialized: {0}")]
    NotInitialized(String),
    #[error("Bad gateway: {0}")]
    BadGateway(String),
    #[error("Vault is down or sealed: {0}")]
    Unavailable(String),
    #[error("Unexpected response: status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
    #[error("Network error communicating with Vault")]
    Network(#[source] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Background task failed: {0}")]
    Background(String),
    #[error("Vault session is closed")]
    SessionClosed,
}

impl VaultError {
    /// Classify a non-success response from the secrets store
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => VaultError::InvalidRequest(message),
            401 => VaultError::Unauthorized(message),
            403 => VaultError::Forbidden(message),
            404 => VaultError::PathNotFound(message),
            412 => VaultError::PreconditionFailed(message),
            429 => VaultError::RateLimited(message),
            500 => VaultError::Internal(message),
            501 => VaultError::NotInitialized(message),
            502 => VaultError::BadGateway(message),
            503 => VaultError::Unavailable(message),
            _ => VaultError::UnexpectedStatus { status, message },
        }
    }

    pub fn path_not_found(mount_point: &str, path: &str) -> Self {
        VaultError::PathNotFound(format!("{}/{}", mount_point.trim_matches('/'), path))
    }

    #[inline]
    pub fn is_path_not_found(&self) -> bool {
        matches!(self, VaultError::PathNotFound(_))
    }

    /// Status code the API layer answers with when this error escapes a handler.
    ///
    /// Store-side conflicts surface as 409, transport and local failures as 503.
    pub fn http_status(&self) -> u16 {
        match self {
            VaultError::InvalidRequest(_) => 400,
            VaultError::Unauthorized(_) => 401,
            VaultError::Forbidden(_) => 403,
            VaultError::PathNotFound(_) => 404,
            VaultError::PreconditionFailed(_) => 409,
            VaultError::RateLimited(_) => 429,
            VaultError::Internal(_) | VaultError::UnexpectedStatus { .. } => 500,
            VaultError::BadGateway(_) => 502,
            VaultError::NotInitialized(_)
            | VaultError::Unavailable(_)
            | VaultError::Network(_)
            | VaultError::Serialization(_)
            | VaultError::Configuration(_)
            | VaultError::Background(_)
            | VaultError::SessionClosed => 503,
        }
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        VaultError::Background(err.to_string())
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
