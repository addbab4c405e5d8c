use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("invalid response from {provider}: {detail}")]
    InvalidResponse { provider: &'static str, detail: String },
    #[error("rate limit exceeded for {0}")]
    RateLimitExceeded(&'static str),
    #[error("API error from {provider}: {status} - {message}")]
    ApiError { provider: &'static str, status: u16, message: String },
}
