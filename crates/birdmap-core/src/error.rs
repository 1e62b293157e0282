use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("coordinates out of range: ({lat}, {lon})")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("message has no text/plain part")]
    NoPlainText,

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
