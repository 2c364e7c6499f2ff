use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::{AppConfig, OAuthClientConfig},
    error::{AppError, AppResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Google,
    Facebook,
}

/// Provider protocol details; everything here is configuration, not logic.
struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    profile: &'static str,
    scope: &'static str,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
        }
    }

    fn endpoints(self) -> Endpoints {
        match self {
            Provider::Google => Endpoints {
                authorize: "https://accounts.google.com/o/oauth2/auth",
                token: "https://oauth2.googleapis.com/token",
                profile: "https://www.googleapis.com/oauth2/v3/userinfo",
                scope: "email profile",
            },
            Provider::Facebook => Endpoints {
                authorize: "https://www.facebook.com/v10.0/dialog/oauth",
                token: "https://graph.facebook.com/v10.0/oauth/access_token",
                profile: "https://graph.facebook.com/v10.0/me?fields=id,email",
                scope: "email",
            },
        }
    }
}

/// What a provider tells us about the signed-in account.
#[derive(Debug, Clone)]
pub struct OAuthIdentity {
    pub email: Option<String>,
    pub access_token: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_url(&self, state: &str) -> String;
    /// Trades an authorization code for the provider token and the account profile.
    async fn exchange_code(&self, code: &str) -> anyhow::Result<OAuthIdentity>;
}

pub struct OAuthClient {
    provider: Provider,
    config: OAuthClientConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenExchange {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    email: Option<String>,
}

impl OAuthClient {
    pub fn new(provider: Provider, config: OAuthClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build oauth http client")?;
        Ok(Self {
            provider,
            config,
            http,
        })
    }
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    fn authorization_url(&self, state: &str) -> String {
        let endpoints = self.provider.endpoints();
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", endpoints.scope),
            ("state", state),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", endpoints.authorize, query)
    }

    async fn exchange_code(&self, code: &str) -> anyhow::Result<OAuthIdentity> {
        let endpoints = self.provider.endpoints();
        let provider = self.provider.as_str();

        let token: TokenExchange = self
            .http
            .post(endpoints.token)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .with_context(|| format!("{provider} token request"))?
            .error_for_status()
            .with_context(|| format!("{provider} token endpoint"))?
            .json()
            .await
            .with_context(|| format!("{provider} token response"))?;

        let profile: Profile = self
            .http
            .get(endpoints.profile)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .with_context(|| format!("{provider} profile request"))?
            .error_for_status()
            .with_context(|| format!("{provider} profile endpoint"))?
            .json()
            .await
            .with_context(|| format!("{provider} profile response"))?;

        debug!(provider, has_email = profile.email.is_some(), "oauth code exchanged");
        Ok(OAuthIdentity {
            email: profile.email,
            access_token: token.access_token,
        })
    }
}

/// Enabled providers; a provider missing from the map answers 404.
#[derive(Clone, Default)]
pub struct OAuthProviders {
    clients: HashMap<Provider, Arc<dyn IdentityProvider>>,
}

impl OAuthProviders {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut providers = Self::default();
        for (provider, cfg) in [
            (Provider::Google, &config.google),
            (Provider::Facebook, &config.facebook),
        ] {
            if let Some(cfg) = cfg {
                providers = providers.with(provider, Arc::new(OAuthClient::new(provider, cfg.clone())?));
            }
        }
        Ok(providers)
    }

    pub fn with(mut self, provider: Provider, client: Arc<dyn IdentityProvider>) -> Self {
        self.clients.insert(provider, client);
        self
    }

    pub fn get(&self, provider: Provider) -> AppResult<Arc<dyn IdentityProvider>> {
        self.clients.get(&provider).cloned().ok_or_else(|| {
            AppError::NotFound(format!("OAuth provider {} is not configured", provider.as_str()))
        })
    }
}

/// Random CSRF state (32 hex characters).
pub fn generate_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(provider: Provider) -> OAuthClient {
        OAuthClient::new(
            provider,
            OAuthClientConfig {
                client_id: "cid".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost:8080/users/google/callback".into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn google_authorization_url_carries_state_and_encoded_redirect() {
        let url = client(Provider::Google).authorization_url("abc123");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains("scope=email%20profile"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fusers%2Fgoogle%2Fcallback"));
        assert!(!url.contains("secret"));
    }

    #[test]
    fn facebook_uses_its_own_dialog() {
        let url = client(Provider::Facebook).authorization_url("s");
        assert!(url.starts_with("https://www.facebook.com/v10.0/dialog/oauth?"));
        assert!(url.contains("scope=email&"));
    }

    #[test]
    fn state_is_random_hex() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn unconfigured_provider_is_not_found() {
        let providers = OAuthProviders::default();
        assert!(matches!(
            providers.get(Provider::Facebook),
            Err(AppError::NotFound(_))
        ));
    }
}
