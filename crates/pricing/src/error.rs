use crate::cache::SharedCallError;

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("price request failed")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from {provider}: {reason}")]
    Response { provider: &'static str, reason: String },

    #[error(transparent)]
    Shared(#[from] SharedCallError),
}
