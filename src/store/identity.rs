//! Authenticated identity, persisted across restarts.
//!
//! The token and the serialized user live in the key-value store under
//! [`TOKEN_KEY`] and [`USER_KEY`]. The in-memory copy is the single source
//! read by every request; the store is only read at hydration.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{AuthResponse, User};

use super::kv::KeyValueStore;

/// Key of the bearer token.
pub const TOKEN_KEY: &str = "drishti_token";
/// Key of the JSON-serialized user.
pub const USER_KEY: &str = "drishti_user";

/// Token plus the user it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Bearer token.
    pub token: String,
    /// Logged-in user.
    pub user: User,
}

/// Holder of the current identity.
pub struct IdentityStore {
    kv: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Identity>>,
}

impl IdentityStore {
    /// Restore the identity persisted in `kv`, if any.
    ///
    /// A token without a user, or a user that no longer parses, is treated
    /// as logged out and both keys are cleared.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    pub async fn hydrate(kv: Arc<dyn KeyValueStore>) -> ApiResult<Self> {
        let token = kv.get(TOKEN_KEY).await?;
        let user = kv.get(USER_KEY).await?;

        let current = match (token, user) {
            (Some(token), Some(raw_user)) => match serde_json::from_str::<User>(&raw_user) {
                Ok(user) => Some(Identity { token, user }),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unreadable stored user");
                    None
                }
            },
            (None, None) => None,
            _ => {
                tracing::warn!("discarding incomplete stored identity");
                None
            }
        };

        if current.is_none() {
            kv.remove(TOKEN_KEY).await?;
            kv.remove(USER_KEY).await?;
        } else {
            tracing::debug!("restored stored identity");
        }

        Ok(Self {
            kv,
            current: RwLock::new(current),
        })
    }

    /// Record a successful authentication and persist it.
    ///
    /// # Errors
    /// Returns an error if the identity cannot be persisted.
    pub async fn login(&self, token: impl Into<String>, user: User) -> ApiResult<Identity> {
        let identity = Identity {
            token: token.into(),
            user,
        };
        let raw_user = serde_json::to_string(&identity.user)?;

        self.kv.set(TOKEN_KEY, &identity.token).await?;
        self.kv.set(USER_KEY, &raw_user).await?;
        *self.current.write().await = Some(identity.clone());

        tracing::info!(username = %identity.user.username, "logged in");
        Ok(identity)
    }

    /// Record an auth response from login or signup.
    ///
    /// # Errors
    /// Returns an error if the identity cannot be persisted.
    pub async fn accept(&self, response: AuthResponse, email: Option<String>) -> ApiResult<Identity> {
        let (token, user) = response.into_user(email);
        self.login(token, user).await
    }

    /// Forget the identity, in memory and on disk.
    ///
    /// # Errors
    /// Returns an error if the stored keys cannot be removed.
    pub async fn logout(&self) -> ApiResult<()> {
        *self.current.write().await = None;
        self.kv.remove(TOKEN_KEY).await?;
        self.kv.remove(USER_KEY).await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Current identity, if logged in.
    pub async fn identity(&self) -> Option<Identity> {
        self.current.read().await.clone()
    }

    /// Current token, if logged in.
    pub async fn token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|identity| identity.token.clone())
    }

    /// Current user, if logged in.
    pub async fn user(&self) -> Option<User> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|identity| identity.user.clone())
    }

    /// Whether a token is held.
    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Current token, or [`ApiError::NotAuthenticated`].
    ///
    /// # Errors
    /// Returns an error when nobody is logged in.
    pub async fn require_token(&self) -> ApiResult<String> {
        self.token().await.ok_or(ApiError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ids::UserId;
    use crate::store::kv::{MemoryKeyValueStore, SqliteKeyValueStore};

    fn alice() -> User {
        User {
            id: UserId::new(7),
            username: "alice".to_string(),
            email: Some("alice@example.test".to_string()),
        }
    }

    #[tokio::test]
    async fn test_starts_logged_out() {
        let identity = IdentityStore::hydrate(Arc::new(MemoryKeyValueStore::new()))
            .await
            .unwrap();
        assert!(!identity.is_authenticated().await);
        assert!(matches!(
            identity.require_token().await,
            Err(ApiError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_login_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.sqlite3");

        {
            let kv = Arc::new(SqliteKeyValueStore::open(&path).await.unwrap());
            let identity = IdentityStore::hydrate(kv).await.unwrap();
            identity.login("tok-1", alice()).await.unwrap();
        }

        let kv = Arc::new(SqliteKeyValueStore::open(&path).await.unwrap());
        let identity = IdentityStore::hydrate(kv).await.unwrap();
        assert_eq!(identity.require_token().await.unwrap(), "tok-1");
        assert_eq!(identity.user().await, Some(alice()));
    }

    #[tokio::test]
    async fn test_logout_clears_store() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let identity = IdentityStore::hydrate(kv.clone()).await.unwrap();
        identity.login("tok", alice()).await.unwrap();

        identity.logout().await.unwrap();
        assert!(identity.token().await.is_none());
        assert_eq!(kv.get(TOKEN_KEY).await.unwrap(), None);
        assert_eq!(kv.get(USER_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_user_is_discarded() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(TOKEN_KEY, "tok").await.unwrap();
        kv.set(USER_KEY, "{not json").await.unwrap();

        let identity = IdentityStore::hydrate(kv.clone()).await.unwrap();
        assert!(!identity.is_authenticated().await);
        assert_eq!(kv.get(TOKEN_KEY).await.unwrap(), None);
        assert_eq!(kv.get(USER_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_without_user_is_discarded() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(TOKEN_KEY, "tok").await.unwrap();

        let identity = IdentityStore::hydrate(kv.clone()).await.unwrap();
        assert!(!identity.is_authenticated().await);
        assert_eq!(kv.get(TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_accept_auth_response() {
        let identity = IdentityStore::hydrate(Arc::new(MemoryKeyValueStore::new()))
            .await
            .unwrap();
        let response = AuthResponse {
            access_token: "tok-2".to_string(),
            user_id: UserId::new(9),
            username: "bob".to_string(),
        };
        let stored = identity.accept(response, None).await.unwrap();
        assert_eq!(stored.user.id, UserId::new(9));
        assert_eq!(identity.require_token().await.unwrap(), "tok-2");
    }
}
