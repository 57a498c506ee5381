//! Bearer credential checks.
//!
//! Token issuance lives outside this server. The gate only needs to know
//! whether a presented token is acceptable.

use subtle::ConstantTimeEq;

pub trait TokenVerifier: Send + Sync {
    /// When false, requests without a token are admitted.
    fn required(&self) -> bool;

    fn verify(&self, token: &str) -> bool;
}

/// Admits every caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAnonymous;

impl TokenVerifier for AllowAnonymous {
    fn required(&self) -> bool {
        false
    }

    fn verify(&self, _token: &str) -> bool {
        true
    }
}

/// Accepts exactly one shared token.
#[derive(Clone)]
pub struct SharedSecretVerifier {
    secret: String,
}

impl SharedSecretVerifier {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for SharedSecretVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecretVerifier").finish_non_exhaustive()
    }
}

impl TokenVerifier for SharedSecretVerifier {
    fn required(&self) -> bool {
        true
    }

    fn verify(&self, token: &str) -> bool {
        bool::from(token.as_bytes().ct_eq(self.secret.as_bytes()))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
#[must_use]
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parses_scheme_case_insensitively() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn shared_secret_accepts_only_its_token() {
        let verifier = SharedSecretVerifier::new("s3cret");
        assert!(verifier.required());
        assert!(verifier.verify("s3cret"));
        assert!(!verifier.verify("s3cre"));
        assert!(!verifier.verify("s3cret!"));
        assert!(!verifier.verify("S3CRET"));
        assert!(!verifier.verify(""));
        assert!(!format!("{verifier:?}").contains("s3cret"));
    }
}
