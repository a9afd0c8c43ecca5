pub mod types;
pub mod guard;
pub mod ollama;
pub mod http;
pub mod mock;

pub use types::*;
pub use guard::*;
pub use ollama::*;
pub use http::*;
pub use mock::*;

use std::time::Duration;

use thiserror::Error;

/// Failure at the boundary to an external model service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Inference service is not reachable at {0}")]
    Connection(String),

    #[error("Inference service returned error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Inference call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference call was cancelled")]
    Cancelled,

    #[error("Inference service returned an empty result")]
    EmptyOutput,
}
