//! Errors raised while handling a single transform request
//!
//! Every variant maps to exactly one HTTP status. The mapping lives here so
//! the handler never has to inspect error text to pick a response.

use crate::http::response::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    /// Bad path structure or a non-integer coordinate
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unknown transform: {0}")]
    UnknownTransform(String),

    /// Body or decoded dimensions above the configured limits
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Failed to decode image: {0}")]
    DecodeFailure(String),

    /// The crop rectangle does not overlap the image
    #[error("Crop rectangle has no overlap with the image")]
    EmptyCropResult,

    #[error("Request deadline exceeded")]
    Timeout,

    #[error("Internal failure: {0}")]
    InternalFailure(String),
}

impl TransformError {
    /// HTTP status returned to the client for this error.
    ///
    /// Client-induced failures are 400, an empty crop is 204, an exhausted
    /// deadline is 503 and anything unanticipated is 500.
    pub fn status(&self) -> StatusCode {
        match self {
            TransformError::MalformedRequest(_)
            | TransformError::UnknownTransform(_)
            | TransformError::PayloadTooLarge(_)
            | TransformError::DecodeFailure(_) => StatusCode::BadRequest,
            TransformError::EmptyCropResult => StatusCode::NoContent,
            TransformError::Timeout => StatusCode::ServiceUnavailable,
            TransformError::InternalFailure(_) => StatusCode::InternalServerError,
        }
    }
}
