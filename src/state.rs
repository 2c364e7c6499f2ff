use std::sync::Arc;

use tracing::info;

use crate::{
    auth::{jwt::JwtKeys, oauth::OAuthProviders},
    config::AppConfig,
    middleware::{api_key::ApiKeyGate, rate_limit::RateLimiter},
    store::{CompanyStore, MemoryStore, PgStore, UserStore},
};

const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub companies: Arc<dyn CompanyStore>,
    pub jwt: JwtKeys,
    pub oauth: OAuthProviders,
    pub api_gate: Arc<ApiKeyGate>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let (users, companies): (Arc<dyn UserStore>, Arc<dyn CompanyStore>) =
            if config.database_url == MEMORY_DATABASE_URL {
                info!("using in-memory store");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn UserStore>, store as Arc<dyn CompanyStore>)
            } else {
                let store = PgStore::connect(&config.database_url, config.db_max_connections).await?;
                store.migrate().await?;
                let store = Arc::new(store);
                (store.clone() as Arc<dyn UserStore>, store as Arc<dyn CompanyStore>)
            };

        let oauth = OAuthProviders::from_config(&config)?;
        Ok(Self::from_parts(config, users, companies, oauth))
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        companies: Arc<dyn CompanyStore>,
        oauth: OAuthProviders,
    ) -> Self {
        Self {
            jwt: JwtKeys::new(&config.jwt),
            api_gate: Arc::new(ApiKeyGate::new(&config.api_key)),
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            config: Arc::new(config),
            users,
            companies,
            oauth,
        }
    }

    /// In-memory state with fixed secrets and no OAuth providers.
    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig::from_lookup(|key| {
            match key {
                "DATABASE_URL" => Some(MEMORY_DATABASE_URL),
                "SECRET_KEY" => Some("test-secret"),
                "API_KEY" => Some("test-api-key"),
                _ => None,
            }
            .map(String::from)
        })
        .expect("test config");

        let store = Arc::new(MemoryStore::new());
        Self::from_parts(config, store.clone(), store, OAuthProviders::default())
    }
}
