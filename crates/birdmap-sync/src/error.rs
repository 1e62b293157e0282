use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("eBird rejected the API key (HTTP {status}); check it or request a new one")]
    Auth { status: u16 },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("eBird rejected region '{region}': {body}")]
    InvalidRegion { region: String, body: String },

    #[error("eBird rate limit reached; retry later")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "http")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(
        status: u16,
        region: &str,
        body: String,
        retry_after_secs: Option<u64>,
    ) -> Self {
        match status {
            401 | 403 => SyncError::Auth { status },
            400 => SyncError::InvalidRegion {
                region: region.to_string(),
                body,
            },
            429 => SyncError::RateLimited { retry_after_secs },
            _ => SyncError::Server { status, body },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth { .. })
    }

    /// Whether retrying later could succeed without changing anything.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::RateLimited { .. } => true,
            SyncError::Server { status, .. } => *status >= 500,
            #[cfg(feature = "http")]
            SyncError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
