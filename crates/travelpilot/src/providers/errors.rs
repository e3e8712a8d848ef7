use reqwest::StatusCode;
use thiserror::Error;

/// Ways a Gemini call can fail. Only `RateLimitExceeded` is retried.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Gemini returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Could not reach Gemini: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid Gemini endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
