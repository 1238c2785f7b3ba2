//! Gatekeeper configuration.
//!
//! Built explicitly and handed to [`crate::Gatekeeper::new`], which validates
//! it once. Nothing here is read from global state after construction.

use axum_extra::extract::cookie::SameSite;
use std::time::Duration;

use crate::crypto::HashParams;
use crate::error::ConfigError;
use crate::keys::{KeyRing, KeySet};

pub const ENV_COOKIE_NAME: &str = "GATEKEEPER_COOKIE_NAME";
pub const ENV_DOMAIN: &str = "GATEKEEPER_DOMAIN";
pub const ENV_TOKEN_LIFETIME: &str = "GATEKEEPER_TOKEN_LIFETIME";
pub const ENV_CURRENT_KEY: &str = "GATEKEEPER_CURRENT_KEY";
pub const ENV_PREVIOUS_KEY: &str = "GATEKEEPER_PREVIOUS_KEY";

const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);
const DEFAULT_RESET_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);
const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);
// keeps expiry arithmetic far away from overflow
const MAX_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct GatekeeperConfig {
    pub(crate) cookie_name: String,
    pub(crate) domain: String,
    pub(crate) same_site: SameSite,
    pub(crate) keys: KeyRing,
    pub(crate) token_lifetime: Duration,
    pub(crate) reset_token_lifetime: Duration,
    pub(crate) cookie_max_age: Duration,
    pub(crate) hash_params: HashParams,
    pub(crate) max_concurrent_hashes: usize,
}

impl GatekeeperConfig {
    pub fn new(cookie_name: impl Into<String>, domain: impl Into<String>, keys: KeyRing) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            cookie_name: cookie_name.into(),
            domain: domain.into(),
            same_site: SameSite::Lax,
            keys,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            reset_token_lifetime: DEFAULT_RESET_TOKEN_LIFETIME,
            cookie_max_age: DEFAULT_COOKIE_MAX_AGE,
            hash_params: HashParams::default(),
            max_concurrent_hashes: workers,
        }
    }

    /// Reads the configuration from the environment, loading `.env` first.
    ///
    /// An empty or absent previous key means there is no previous generation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let cookie_name = required(ENV_COOKIE_NAME)?;
        let domain = required(ENV_DOMAIN)?;
        let current = KeySet::parse(&required(ENV_CURRENT_KEY)?)?;
        let previous = match lookup(ENV_PREVIOUS_KEY).filter(|v| !v.trim().is_empty()) {
            Some(key) => Some(KeySet::parse(&key)?),
            None => None,
        };

        let mut config = Self::new(cookie_name, domain, KeyRing::new(current, previous));

        if let Some(minutes) = lookup(ENV_TOKEN_LIFETIME) {
            let minutes: u64 = minutes.trim().parse().map_err(|_| ConfigError::Invalid {
                name: ENV_TOKEN_LIFETIME,
                reason: format!("'{minutes}' is not a number of minutes"),
            })?;
            config = config.token_lifetime(Duration::from_secs(minutes.saturating_mul(60)));
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn reset_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.reset_token_lifetime = lifetime;
        self
    }

    /// Oldest encoded cookie value that will still be decoded.
    #[must_use]
    pub fn cookie_max_age(mut self, max_age: Duration) -> Self {
        self.cookie_max_age = max_age;
        self
    }

    #[must_use]
    pub fn hash_params(mut self, params: HashParams) -> Self {
        self.hash_params = params;
        self
    }

    /// Only `Lax` and `Strict` pass validation.
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Upper bound on password hashes computed at the same time.
    #[must_use]
    pub fn max_concurrent_hashes(mut self, permits: usize) -> Self {
        self.max_concurrent_hashes = permits;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &'static str, reason: &str| ConfigError::Invalid {
            name,
            reason: reason.to_string(),
        };

        if self.cookie_name.is_empty()
            || !self
                .cookie_name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"-_.".contains(&b))
        {
            return Err(invalid(
                "cookie_name",
                "must be non-empty and use only letters, digits, '-', '_' or '.'",
            ));
        }
        for (name, lifetime) in [
            ("token_lifetime", self.token_lifetime),
            ("reset_token_lifetime", self.reset_token_lifetime),
            ("cookie_max_age", self.cookie_max_age),
        ] {
            if lifetime.is_zero() || lifetime > MAX_LIFETIME {
                return Err(invalid(name, "must be positive and at most ten years"));
            }
        }
        if self.same_site == SameSite::None {
            return Err(invalid("same_site", "must be Lax or Strict"));
        }
        if self.max_concurrent_hashes == 0 {
            return Err(invalid("max_concurrent_hashes", "must be at least 1"));
        }
        self.hash_params
            .validate()
            .map_err(|e| invalid("hash_params", &e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ring() -> KeyRing {
        KeyRing::new(KeySet::generate().unwrap(), None)
    }

    fn env(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = GatekeeperConfig::new("auth", "example.com", ring());
        assert!(config.validate().is_ok());
        assert_eq!(config.token_lifetime, DEFAULT_TOKEN_LIFETIME);
        assert_eq!(config.same_site, SameSite::Lax);
    }

    #[test]
    fn zero_lifetime_is_rejected() {
        let config = GatekeeperConfig::new("auth", "example.com", ring()).token_lifetime(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "token_lifetime", .. })
        ));
    }

    #[test]
    fn same_site_none_is_rejected() {
        let config = GatekeeperConfig::new("auth", "example.com", ring()).same_site(SameSite::None);
        assert!(config.validate().is_err());

        let config = GatekeeperConfig::new("auth", "example.com", ring()).same_site(SameSite::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_cookie_name_is_rejected() {
        assert!(GatekeeperConfig::new("", "example.com", ring()).validate().is_err());
        assert!(GatekeeperConfig::new("a b", "example.com", ring()).validate().is_err());
        assert!(GatekeeperConfig::new("a;b", "example.com", ring()).validate().is_err());
    }

    #[test]
    fn zero_hash_permits_are_rejected() {
        let config = GatekeeperConfig::new("auth", "example.com", ring()).max_concurrent_hashes(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_lookup() {
        let current = KeySet::generate().unwrap();
        let previous = KeySet::generate().unwrap();

        let config = GatekeeperConfig::from_lookup(env(&[
            (ENV_COOKIE_NAME, "auth".into()),
            (ENV_DOMAIN, "example.com".into()),
            (ENV_TOKEN_LIFETIME, "15".into()),
            (ENV_CURRENT_KEY, current.encode().to_string()),
            (ENV_PREVIOUS_KEY, previous.encode().to_string()),
        ]))
        .unwrap();

        assert_eq!(config.cookie_name(), "auth");
        assert_eq!(config.token_lifetime, Duration::from_secs(15 * 60));
        assert_eq!(config.keys().current(), &current);
        assert_eq!(config.keys().previous(), Some(&previous));
    }

    #[test]
    fn empty_previous_key_means_none() {
        let config = GatekeeperConfig::from_lookup(env(&[
            (ENV_COOKIE_NAME, "auth".into()),
            (ENV_DOMAIN, "example.com".into()),
            (ENV_CURRENT_KEY, KeySet::generate().unwrap().encode().to_string()),
            (ENV_PREVIOUS_KEY, String::new()),
        ]))
        .unwrap();

        assert!(config.keys().previous().is_none());
    }

    #[test]
    fn missing_key_is_reported() {
        let err = GatekeeperConfig::from_lookup(env(&[
            (ENV_COOKIE_NAME, "auth".into()),
            (ENV_DOMAIN, "example.com".into()),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Missing(ENV_CURRENT_KEY)));
    }

    #[test]
    fn malformed_key_is_reported() {
        let err = GatekeeperConfig::from_lookup(env(&[
            (ENV_COOKIE_NAME, "auth".into()),
            (ENV_DOMAIN, "example.com".into()),
            (ENV_CURRENT_KEY, "no-separator".into()),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Key(_)));
    }

    #[test]
    fn bad_lifetime_is_reported() {
        let err = GatekeeperConfig::from_lookup(env(&[
            (ENV_COOKIE_NAME, "auth".into()),
            (ENV_DOMAIN, "example.com".into()),
            (ENV_TOKEN_LIFETIME, "soon".into()),
            (ENV_CURRENT_KEY, KeySet::generate().unwrap().encode().to_string()),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { name: ENV_TOKEN_LIFETIME, .. }));
    }
}
