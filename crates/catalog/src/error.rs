use thiserror::Error;

/// Failures talking to the catalog web API
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The bearer token was rejected (expired or revoked)
    #[error("catalog rejected the bearer token")]
    Unauthorized,

    #[error("catalog returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog client id/secret are not configured")]
    NotConfigured,
}
