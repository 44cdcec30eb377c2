use reqwest::StatusCode;

/// Failure taxonomy at the fetch boundary. Everything here is best-effort:
/// public client operations translate these into empty/`None` results and a
/// log line, never a panic or a propagated error.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("not found")]
    NotFound,
    #[error("provider returned {0}")]
    Status(StatusCode),
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
