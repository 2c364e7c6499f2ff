use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    dto::{TokenResponse, UserInfo},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
};
use crate::{
    error::{AppError, AppResult},
    store::{NewUser, User, UserStore},
};

pub const DEFAULT_ROLE: &str = "user";

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Inputs for [`register_or_fetch`]; OAuth sign-ins leave `password` empty.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub password: Option<&'a str>,
    pub oauth_provider: Option<&'a str>,
    pub oauth_token: Option<&'a str>,
    pub role: &'a str,
}

/// Returns the existing user for `email` untouched, or creates one.
///
/// Repeat calls never update role, provider or token. Two concurrent first
/// registrations race on the store's unique index and the loser gets
/// [`AppError::Conflict`].
pub async fn register_or_fetch(users: &dyn UserStore, reg: Registration<'_>) -> AppResult<User> {
    if let Some(existing) = users.find_user_by_email(reg.email).await? {
        info!(user_id = existing.id, "registration for existing user");
        return Ok(existing);
    }

    let hashed_password = reg.password.map(hash_password).transpose()?;
    let user = users
        .create_user(NewUser {
            email: reg.email.to_string(),
            hashed_password,
            oauth_provider: reg.oauth_provider.map(String::from),
            oauth_token: reg.oauth_token.map(String::from),
            role: reg.role.to_string(),
        })
        .await?;

    info!(user_id = user.id, provider = ?user.oauth_provider, role = %user.role, "user registered");
    Ok(user)
}

pub fn token_response(keys: &JwtKeys, user: &User) -> AppResult<TokenResponse> {
    let access_token = keys.sign_access(&user.email, &user.role)?;
    let refresh_token = keys.sign_refresh(&user.email, &user.role)?;
    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "bearer".into(),
        user_info: UserInfo {
            id: user.id,
            email: user.email.clone(),
            is_active: user.is_active,
            role: user.role.clone(),
        },
    })
}

pub async fn login(
    users: &dyn UserStore,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> AppResult<TokenResponse> {
    let Some(user) = users.find_user_by_email(email).await? else {
        warn!("login for unknown email");
        return Err(AppError::BadCredentials);
    };

    let Some(hash) = user.hashed_password.as_deref() else {
        warn!(user_id = user.id, "password login on oauth-only account");
        return Err(AppError::BadCredentials);
    };

    // A corrupt stored digest is logged inside verify_password and treated as a mismatch.
    if !verify_password(password, hash).unwrap_or(false) {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::BadCredentials);
    }

    info!(user_id = user.id, "user logged in");
    token_response(keys, &user)
}

/// Issues a fresh pair using the role currently stored for the subject.
pub async fn refresh(
    users: &dyn UserStore,
    keys: &JwtKeys,
    refresh_token: &str,
) -> AppResult<TokenResponse> {
    let claims = keys.verify_refresh(refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::InvalidToken("Invalid refresh token".into())
    })?;

    let user = users
        .find_user_by_email(&claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    info!(user_id = user.id, "tokens refreshed");
    token_response(keys, &user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::claims::TokenKind,
        config::JwtConfig,
        store::{MemoryStore, StoreError},
    };
    use async_trait::async_trait;
    use jsonwebtoken::Algorithm;

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "test-secret".into(),
            algorithm: Algorithm::HS256,
            issuer: "test".into(),
            audience: "test".into(),
            ttl_minutes: 5,
            refresh_ttl_days: 1,
        })
    }

    fn password_reg<'a>(email: &'a str, password: &'a str, role: &'a str) -> Registration<'a> {
        Registration {
            email,
            password: Some(password),
            oauth_provider: Some("email-password"),
            oauth_token: None,
            role,
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn registering_twice_returns_same_user_and_keeps_role() {
        let store = MemoryStore::new();
        let first = register_or_fetch(&store, password_reg("a@b.com", "pw", "user"))
            .await
            .unwrap();
        let second = register_or_fetch(&store, password_reg("a@b.com", "other", "admin"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.role, "user");
        assert_eq!(first.hashed_password, second.hashed_password);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn oauth_registration_stores_no_password() {
        let store = MemoryStore::new();
        let user = register_or_fetch(
            &store,
            Registration {
                email: "g@b.com",
                password: None,
                oauth_provider: Some("google"),
                oauth_token: Some("ya29.token"),
                role: DEFAULT_ROLE,
            },
        )
        .await
        .unwrap();
        assert!(user.hashed_password.is_none());
        assert_eq!(user.oauth_provider.as_deref(), Some("google"));
        assert_eq!(user.oauth_token.as_deref(), Some("ya29.token"));
        assert!(user.is_active);
    }

    /// Store whose existence check always misses, as in a lost registration race.
    struct RacingStore(MemoryStore);

    #[async_trait]
    impl UserStore for RacingStore {
        async fn find_user_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Ok(None)
        }
        async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
            self.0.find_user_by_id(id).await
        }
        async fn list_users(&self) -> Result<Vec<User>, StoreError> {
            self.0.list_users().await
        }
        async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
            self.0.create_user(user).await
        }
        async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
            self.0.delete_user(id).await
        }
    }

    #[tokio::test]
    async fn losing_registration_race_is_a_conflict() {
        let store = RacingStore(MemoryStore::new());
        register_or_fetch(&store, password_reg("a@b.com", "pw", "user"))
            .await
            .unwrap();
        let err = register_or_fetch(&store, password_reg("a@b.com", "pw", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_embeds_email_and_stored_role() {
        let store = MemoryStore::new();
        let keys = keys();
        register_or_fetch(&store, password_reg("boss@b.com", "pw", "admin"))
            .await
            .unwrap();

        let pair = login(&store, &keys, "boss@b.com", "pw").await.unwrap();
        assert_eq!(pair.token_type, "bearer");
        let access = keys.verify_access(&pair.access_token).unwrap();
        let refresh = keys.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(access.sub, "boss@b.com");
        assert_eq!(access.role, "admin");
        assert_eq!(refresh.sub, "boss@b.com");
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert_eq!(pair.user_info.role, "admin");
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let store = MemoryStore::new();
        let keys = keys();
        register_or_fetch(&store, password_reg("a@b.com", "pw", "user"))
            .await
            .unwrap();

        let wrong_pw = login(&store, &keys, "a@b.com", "nope").await.unwrap_err();
        let unknown = login(&store, &keys, "x@b.com", "pw").await.unwrap_err();
        assert!(matches!(wrong_pw, AppError::BadCredentials));
        assert!(matches!(unknown, AppError::BadCredentials));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn oauth_only_account_cannot_password_login() {
        let store = MemoryStore::new();
        register_or_fetch(
            &store,
            Registration {
                email: "g@b.com",
                password: None,
                oauth_provider: Some("google"),
                oauth_token: None,
                role: DEFAULT_ROLE,
            },
        )
        .await
        .unwrap();
        let err = login(&store, &keys(), "g@b.com", "").await.unwrap_err();
        assert!(matches!(err, AppError::BadCredentials));
    }

    #[tokio::test]
    async fn refresh_requires_refresh_token_and_existing_user() {
        let store = MemoryStore::new();
        let keys = keys();
        let user = register_or_fetch(&store, password_reg("a@b.com", "pw", "user"))
            .await
            .unwrap();
        let pair = token_response(&keys, &user).unwrap();

        let err = refresh(&store, &keys, &pair.access_token).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));

        let renewed = refresh(&store, &keys, &pair.refresh_token).await.unwrap();
        assert_eq!(renewed.user_info.id, user.id);

        store.delete_user(user.id).await.unwrap();
        let err = refresh(&store, &keys, &pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn refresh_uses_current_stored_role() {
        let store = MemoryStore::new();
        let keys = keys();
        register_or_fetch(&store, password_reg("a@b.com", "pw", "admin"))
            .await
            .unwrap();
        // Token minted while the subject still claimed a different role.
        let stale = keys.sign_refresh("a@b.com", "user").unwrap();
        let renewed = refresh(&store, &keys, &stale).await.unwrap();
        let claims = keys.verify_access(&renewed.access_token).unwrap();
        assert_eq!(claims.role, "admin");
    }
}
