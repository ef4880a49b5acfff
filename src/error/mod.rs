mod oauth;
mod signpost;

pub use oauth::OauthError;
pub use signpost::{ApiErrorBody, ApiErrorObject, SignpostError};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
