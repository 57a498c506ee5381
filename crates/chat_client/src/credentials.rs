use async_trait::async_trait;

use crate::error::ClientError;

/// Supplies a bearer token. Called before every request; implementations must
/// not hand back a token they already know to be expired.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// `Ok(None)` means the user is signed out.
    async fn fresh_token(&self) -> Result<Option<String>, ClientError>;
}

/// Fixed token, or none at all.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn fresh_token(&self) -> Result<Option<String>, ClientError> {
        Ok(self.token.clone())
    }
}

/// Resolves a token or fails with [`ClientError::MissingCredential`].
pub async fn require_token(provider: &dyn CredentialProvider) -> Result<String, ClientError> {
    provider
        .fresh_token()
        .await?
        .filter(|token| !token.trim().is_empty())
        .ok_or(ClientError::MissingCredential)
}
