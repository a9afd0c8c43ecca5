pub mod prompt;
pub mod validator;
pub mod fingerprint;
pub mod cache;

pub use prompt::*;
pub use validator::*;
pub use fingerprint::*;
pub use cache::*;

use thiserror::Error;

use super::inference::InferenceError;

/// Number of items every recommendation batch must contain.
pub const RECOMMENDATION_COUNT: usize = 5;

#[derive(Error, Debug)]
pub enum RecommendationError {
    #[error("Recommendation service failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Recommendation output rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("Recommendation cache lock poisoned")]
    LockFailed,
}

/// Structural rule broken by the generative service's output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Expected {expected} items, found {found}")]
    WrongCount { expected: usize, found: usize },

    #[error("Item {position} is numbered {found}")]
    Numbering { position: usize, found: usize },

    #[error("Item {position} has {length} characters (allowed 15-500)")]
    Length { position: usize, length: usize },

    #[error("Item {position} does not start with an uppercase letter")]
    Capitalization { position: usize },

    #[error("Item {position} does not end with terminal punctuation")]
    Punctuation { position: usize },

    #[error("Item {position} contains no Portuguese letters")]
    NoLetters { position: usize },

    #[error("Item {position} contains forbidden token '{token}'")]
    ForbiddenToken { position: usize, token: String },
}
