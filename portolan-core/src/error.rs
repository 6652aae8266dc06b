use thiserror::Error;

/// Unified error type for Portolan.
#[derive(Error, Debug)]
pub enum PortolanError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Resource busy: {0}")]
    ResourceBusy(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

impl PortolanError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            PortolanError::NotFound(_) => 404,
            PortolanError::InvalidInput(_) => 400,
            PortolanError::ResourceBusy(_) => 409,
            PortolanError::Forbidden(_) => 403,
            _ => 500,
        }
    }

    /// JSON error body.
    pub fn to_json_body(&self) -> Vec<u8> {
        let status = self.status_code();
        let msg = self.to_string();
        serde_json::json!({"error": msg, "status": status})
            .to_string()
            .into_bytes()
    }
}
