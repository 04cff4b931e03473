use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::ServiceError;
use crate::models::users::{Identity, Role};
use crate::repositories::identity::{TokenVerifier, VerifyError};
use crate::repositories::UserStore;

pub const MISSING_TOKEN: &str = "Unauthorized access, No token provided";
pub const INVALID_CREDENTIALS: &str = "Unauthorized access, Invalid credentials";
pub const FORBIDDEN: &str = "Forbidden: Insufficient permissions";

/// Resolves bearer credentials to local identities.
///
/// An invalid token and a valid token without a local account are reported
/// to the caller identically; only the logs tell them apart.
pub struct Authenticator {
    verifier: Arc<dyn TokenVerifier>,
    users: Arc<dyn UserStore>,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn TokenVerifier>, users: Arc<dyn UserStore>) -> Self {
        Self { verifier, users }
    }

    /// Verifies the token only. Used by registration, where no local user exists yet.
    pub async fn verify_subject(&self, token: &str) -> Result<String, ServiceError> {
        if token.trim().is_empty() {
            return Err(ServiceError::Unauthenticated(MISSING_TOKEN.to_string()));
        }

        self.verifier.verify(token).await.map_err(|e| {
            match &e {
                VerifyError::InvalidToken(reason) => {
                    log::warn!("Rejected bearer token: {}", reason)
                }
                VerifyError::ProviderUnavailable(reason) => {
                    log::error!("Identity provider unavailable: {}", reason)
                }
            }
            ServiceError::Unauthenticated(INVALID_CREDENTIALS.to_string())
        })
    }

    pub async fn authenticate(&self, token: &str) -> Result<Identity, ServiceError> {
        let subject_id = self.verify_subject(token).await?;

        let user = self
            .users
            .find_user_by_external_id(&subject_id)
            .await
            .map_err(|e| ServiceError::persistence("User lookup", e))?;

        match user {
            Some(user) => Ok(Identity {
                subject_id,
                role: user.role,
                user_id: user.id,
            }),
            None => {
                log::warn!("Verified subject {} has no local account: user not found", subject_id);
                Err(ServiceError::Unauthenticated(INVALID_CREDENTIALS.to_string()))
            }
        }
    }
}

/// Extracts the credential from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

pub fn require_role(identity: &Identity, role: Role) -> Result<(), ServiceError> {
    if identity.role == role {
        Ok(())
    } else {
        log::warn!(
            "User {} with role {} denied access requiring {}",
            identity.user_id,
            identity.role,
            role
        );
        Err(ServiceError::Forbidden(FORBIDDEN.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{user_record, StaticVerifier};
    use crate::repositories::memory::MemoryStore;
    use axum::http::HeaderValue;

    fn authenticator(store: Arc<MemoryStore>) -> Authenticator {
        let verifier = StaticVerifier::new(&[("good-token", "firebase-1"), ("orphan-token", "firebase-2")]);
        Authenticator::new(Arc::new(verifier), store)
    }

    #[tokio::test]
    async fn resolves_token_to_local_identity() {
        let store = Arc::new(MemoryStore::new());
        let user = store.add_user(user_record("firebase-1", Role::SuperAdmin));

        let identity = authenticator(store).authenticate("good-token").await.unwrap();

        assert_eq!(
            identity,
            Identity {
                subject_id: "firebase-1".to_string(),
                role: Role::SuperAdmin,
                user_id: user.id,
            }
        );
    }

    #[tokio::test]
    async fn unknown_local_user_looks_like_bad_token() {
        let store = Arc::new(MemoryStore::new());
        let auth = authenticator(store);

        let orphan = auth.authenticate("orphan-token").await.unwrap_err();
        let forged = auth.authenticate("forged-token").await.unwrap_err();

        assert!(matches!(orphan, ServiceError::Unauthenticated(ref m) if m == INVALID_CREDENTIALS));
        assert!(matches!(forged, ServiceError::Unauthenticated(ref m) if m == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn provider_outage_is_unauthenticated() {
        let store = Arc::new(MemoryStore::new());
        let auth = authenticator(store);

        let error = auth.authenticate(StaticVerifier::OUTAGE_TOKEN).await.unwrap_err();
        assert!(matches!(error, ServiceError::Unauthenticated(_)));
    }

    #[test]
    fn parses_bearer_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn role_guard() {
        let admin = Identity {
            subject_id: "s".to_string(),
            role: Role::SuperAdmin,
            user_id: "u".to_string(),
        };
        let user = Identity {
            role: Role::User,
            ..admin.clone()
        };

        assert!(require_role(&admin, Role::SuperAdmin).is_ok());
        assert!(matches!(
            require_role(&user, Role::SuperAdmin),
            Err(ServiceError::Forbidden(_))
        ));
    }
}
