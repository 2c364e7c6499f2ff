use std::{collections::HashSet, str::FromStr};

use anyhow::Context;
use jsonwebtoken::Algorithm;

/// Paths reachable without an `X-API-KEY` header unless `API_KEY_EXEMPT_PATHS` overrides them.
pub const DEFAULT_EXEMPT_PATHS: &[&str] = &[
    "/docs",
    "/openapi.json",
    "/redoc",
    "/users/login/email-password",
    "/users/login/google",
    "/users/login/facebook",
];

/// Upper bounds keep `exp` representable; ten years either way.
pub const MAX_ACCESS_TTL_MINUTES: i64 = 10 * 365 * 24 * 60;
pub const MAX_REFRESH_TTL_DAYS: i64 = 10 * 365;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct ApiKeyConfig {
    pub key: String,
    pub exempt_paths: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub times: u32,
    pub seconds: u64,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt: JwtConfig,
    pub api_key: ApiKeyConfig,
    pub rate_limit: RateLimitConfig,
    pub google: Option<OAuthClientConfig>,
    pub facebook: Option<OAuthClientConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} must be set"));
        let parsed = |key: &str, default: i64| -> anyhow::Result<i64> {
            match lookup(key) {
                Some(v) => v
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("{key} must be an integer")),
                None => Ok(default),
            }
        };

        let algorithm = lookup("ALGORITHM").unwrap_or_else(|| "HS256".into());
        let algorithm = Algorithm::from_str(algorithm.trim())
            .map_err(|_| anyhow::anyhow!("unknown ALGORITHM {algorithm}"))?;
        anyhow::ensure!(
            matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512),
            "ALGORITHM must be one of HS256, HS384, HS512"
        );

        let jwt = JwtConfig {
            secret: required("SECRET_KEY")?,
            algorithm,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "authgate".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "authgate-users".into()),
            ttl_minutes: parsed("ACCESS_TOKEN_EXPIRE_MINUTES", 30)?,
            refresh_ttl_days: parsed("REFRESH_TOKEN_EXPIRE_DAYS", 7)?,
        };
        anyhow::ensure!(jwt.ttl_minutes > 0, "ACCESS_TOKEN_EXPIRE_MINUTES must be positive");
        anyhow::ensure!(jwt.refresh_ttl_days > 0, "REFRESH_TOKEN_EXPIRE_DAYS must be positive");
        anyhow::ensure!(
            jwt.ttl_minutes <= MAX_ACCESS_TTL_MINUTES,
            "ACCESS_TOKEN_EXPIRE_MINUTES must be at most {MAX_ACCESS_TTL_MINUTES}"
        );
        anyhow::ensure!(
            jwt.refresh_ttl_days <= MAX_REFRESH_TTL_DAYS,
            "REFRESH_TOKEN_EXPIRE_DAYS must be at most {MAX_REFRESH_TTL_DAYS}"
        );

        let exempt_paths = match lookup("API_KEY_EXEMPT_PATHS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            None => DEFAULT_EXEMPT_PATHS.iter().map(|p| p.to_string()).collect(),
        };
        let api_key = ApiKeyConfig {
            key: required("API_KEY")?,
            exempt_paths,
        };

        let rate_limit = RateLimitConfig {
            times: u32::try_from(parsed("RATE_LIMIT_TIMES", 10)?)
                .context("RATE_LIMIT_TIMES out of range")?,
            seconds: u64::try_from(parsed("RATE_LIMIT_SECONDS", 60)?)
                .context("RATE_LIMIT_SECONDS out of range")?,
        };
        anyhow::ensure!(
            rate_limit.times > 0 && rate_limit.seconds > 0,
            "rate limit window must be positive"
        );

        let oauth = |prefix: &str| -> anyhow::Result<Option<OAuthClientConfig>> {
            let Some(client_id) = lookup(&format!("{prefix}_CLIENT_ID")) else {
                return Ok(None);
            };
            Ok(Some(OAuthClientConfig {
                client_id,
                client_secret: required(&format!("{prefix}_CLIENT_SECRET"))?,
                redirect_uri: required(&format!("{prefix}_REDIRECT_URI"))?,
            }))
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: u32::try_from(parsed("DB_MAX_CONNECTIONS", 10)?)
                .context("DB_MAX_CONNECTIONS out of range")?,
            jwt,
            api_key,
            rate_limit,
            google: oauth("GOOGLE")?,
            facebook: oauth("FACEBOOK")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "memory://"),
        ("SECRET_KEY", "s3cret"),
        ("API_KEY", "key"),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let cfg = AppConfig::from_lookup(lookup_from(BASE)).expect("config");
        assert_eq!(cfg.jwt.algorithm, Algorithm::HS256);
        assert_eq!(cfg.jwt.ttl_minutes, 30);
        assert_eq!(cfg.jwt.refresh_ttl_days, 7);
        assert_eq!(cfg.rate_limit.times, 10);
        assert_eq!(cfg.rate_limit.seconds, 60);
        assert_eq!(cfg.db_max_connections, 10);
        assert!(cfg.google.is_none());
        assert!(cfg.facebook.is_none());
        assert_eq!(cfg.api_key.exempt_paths.len(), DEFAULT_EXEMPT_PATHS.len());
        assert!(cfg.api_key.exempt_paths.contains("/users/login/google"));
        assert!(!cfg.api_key.exempt_paths.contains("/users/google/callback"));
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "memory://"),
            ("API_KEY", "key"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SECRET_KEY"));
    }

    #[test]
    fn rejects_asymmetric_algorithm() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ALGORITHM", "RS256"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn exempt_paths_are_configurable() {
        let mut pairs = BASE.to_vec();
        pairs.push(("API_KEY_EXEMPT_PATHS", "/docs, /users/google/callback,,"));
        let cfg = AppConfig::from_lookup(lookup_from(&pairs)).expect("config");
        assert_eq!(cfg.api_key.exempt_paths.len(), 2);
        assert!(cfg.api_key.exempt_paths.contains("/users/google/callback"));
    }

    #[test]
    fn oauth_provider_needs_secret_once_enabled() {
        let mut pairs = BASE.to_vec();
        pairs.push(("GOOGLE_CLIENT_ID", "cid"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());

        pairs.push(("GOOGLE_CLIENT_SECRET", "csecret"));
        pairs.push(("GOOGLE_REDIRECT_URI", "http://localhost:8080/users/google/callback"));
        let cfg = AppConfig::from_lookup(lookup_from(&pairs)).expect("config");
        let google = cfg.google.expect("google enabled");
        assert_eq!(google.client_id, "cid");
    }

    #[test]
    fn oversized_token_lifetimes_are_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("REFRESH_TOKEN_EXPIRE_DAYS", "9223372036854775807"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("REFRESH_TOKEN_EXPIRE_DAYS"));

        let mut pairs = BASE.to_vec();
        pairs.push(("ACCESS_TOKEN_EXPIRE_MINUTES", "9223372036854775807"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("ACCESS_TOKEN_EXPIRE_MINUTES"));

        let mut pairs = BASE.to_vec();
        pairs.push(("REFRESH_TOKEN_EXPIRE_DAYS", "3650"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_ok());
    }
}
