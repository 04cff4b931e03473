use async_trait::async_trait;

pub mod firebase;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("token rejected by identity provider: {0}")]
    InvalidToken(String),
    #[error("identity provider unreachable: {0}")]
    ProviderUnavailable(String),
}

/// Checks an opaque bearer credential with the external identity provider
/// and returns the provider's subject id.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, VerifyError>;
}
