pub mod config;
pub mod cookie;
mod crypto;
pub mod error;
mod format;
pub mod keys;
pub mod middleware;
mod password;
pub mod storage;
pub mod store;
pub mod token;

pub use crate::config::GatekeeperConfig;
pub use crate::cookie::{CookieSettings, KeyedCookieCodec};
pub use crate::crypto::HashParams;
pub use crate::error::{
    ConfigError, CookieError, ErrorKind, GatekeeperError, KeyError, PasswordError,
};
pub use crate::format::PasswordRecord;
pub use crate::keys::{KeyRing, KeySet};
pub use crate::middleware::{AccessGuardLayer, require_authenticated, require_unauthenticated};
pub use crate::password::{hash_password, verify_password};
pub use crate::storage::KeyFile;
pub use crate::store::{CredentialStore, MemoryStore, TokenStore, UserRecord};
pub use crate::token::{Token, TokenType};

use anyhow::{Context, Result};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{TimeDelta, Utc};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info};
use zeroize::Zeroizing;

// hashed once per process so unknown users cost as much as known ones
const DUMMY_PASSWORD: &str = "gatekeeper-timing-equaliser";

/// Outcome of checking a request's authentication cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Authenticated { user_id: String },
    Anonymous,
}

impl Authentication {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Authentication::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Authentication::Authenticated { user_id } => Some(user_id),
            Authentication::Anonymous => None,
        }
    }
}

/// Issues and validates credentials for one site.
///
/// Holds only immutable configuration, the cookie codec (whose key ring can
/// be swapped atomically) and a handle to the application's store, so a
/// single instance can be shared across every request task.
pub struct Gatekeeper<S> {
    store: Arc<S>,
    codec: KeyedCookieCodec,
    cookie: CookieSettings,
    token_lifetime: TimeDelta,
    reset_token_lifetime: TimeDelta,
    hash_params: HashParams,
    hash_permits: Arc<Semaphore>,
    dummy_record: OnceCell<String>,
}

impl<S: TokenStore> Gatekeeper<S> {
    pub fn new(config: GatekeeperConfig, store: Arc<S>) -> Result<Self, ConfigError> {
        config.validate()?;

        let token_lifetime = to_delta("token_lifetime", config.token_lifetime)?;
        let reset_token_lifetime = to_delta("reset_token_lifetime", config.reset_token_lifetime)?;

        let codec = KeyedCookieCodec::new(config.keys).with_max_age(config.cookie_max_age);
        let cookie = CookieSettings {
            name: config.cookie_name,
            domain: config.domain,
            same_site: config.same_site,
            lifetime: config.token_lifetime,
        };

        Ok(Self {
            store,
            codec,
            cookie,
            token_lifetime,
            reset_token_lifetime,
            hash_params: config.hash_params,
            hash_permits: Arc::new(Semaphore::new(config.max_concurrent_hashes)),
            dummy_record: OnceCell::new(),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Snapshot of the key ring currently in use.
    pub fn keys(&self) -> Arc<KeyRing> {
        self.codec.keys()
    }

    /// Registers a new user and starts an authenticated session for them.
    ///
    /// Fails with [`GatekeeperError::UserAlreadyExists`] when the email is
    /// taken. Any failed step aborts the whole operation.
    pub async fn sign_user_in(
        &self,
        email: &str,
        password: &str,
        origin: &str,
        remember: bool,
    ) -> Result<Cookie<'static>, GatekeeperError> {
        let exists = self
            .store
            .user_exists(email)
            .await
            .map_err(GatekeeperError::FindUser)?;
        if exists {
            debug!("registration rejected: email already registered");
            return Err(GatekeeperError::UserAlreadyExists(email.to_string()));
        }

        let password_hash = self.hash(password).await?;
        let user_id = self
            .store
            .add_user(email, &password_hash)
            .await
            .map_err(GatekeeperError::AddUser)?;

        let cookie = self.start_session(&user_id, origin, remember).await?;
        info!(%user_id, "registered new user");
        Ok(cookie)
    }

    /// Resolves the authentication cookie in `jar` to a user.
    ///
    /// A missing, undecodable, unknown, expired or mismatched token is
    /// [`Authentication::Anonymous`]. Only store failures are errors.
    pub async fn validate_authentication_token(
        &self,
        jar: &CookieJar,
    ) -> Result<Authentication, GatekeeperError> {
        let Some(cookie) = jar.get(&self.cookie.name) else {
            return Ok(Authentication::Anonymous);
        };

        let value: Zeroizing<String> = match self.codec.decode(&self.cookie.name, cookie.value()) {
            Ok(value) => Zeroizing::new(value),
            Err(_) => {
                debug!("authentication cookie could not be decoded");
                return Ok(Authentication::Anonymous);
            }
        };

        let token = self
            .store
            .get_token(&value)
            .await
            .map_err(GatekeeperError::GetToken)?;

        match token {
            Some(token) if token.is_valid(&value, TokenType::Authentication, Utc::now()) => {
                Ok(Authentication::Authenticated {
                    user_id: token.user_id().to_string(),
                })
            }
            Some(token) => {
                debug!(
                    token_type = %token.token_type(),
                    valid_until = %token.valid_until(),
                    "authentication token rejected"
                );
                Ok(Authentication::Anonymous)
            }
            None => {
                debug!("authentication token not found");
                Ok(Authentication::Anonymous)
            }
        }
    }

    /// Persists an email reset token for `user_id` and returns its value,
    /// ready to be mailed to the user.
    pub async fn issue_password_reset_token(
        &self,
        user_id: &str,
        origin: &str,
    ) -> Result<String, GatekeeperError> {
        let token = Token::issue(
            TokenType::EmailReset,
            user_id,
            origin,
            self.reset_token_lifetime,
            Utc::now(),
        )
        .map_err(GatekeeperError::GenerateToken)?;

        self.store
            .add_token(&token)
            .await
            .map_err(GatekeeperError::AddToken)?;

        info!(%user_id, "issued password reset token");
        Ok(token.value().to_string())
    }

    /// Returns the owner of a live email reset token, `None` for anything else.
    pub async fn validate_password_reset_token(
        &self,
        value: &str,
    ) -> Result<Option<String>, GatekeeperError> {
        let token = self
            .store
            .get_token(value)
            .await
            .map_err(GatekeeperError::GetToken)?;

        Ok(token
            .filter(|t| t.is_valid(value, TokenType::EmailReset, Utc::now()))
            .map(|t| t.user_id().to_string()))
    }

    /// Installs `next` as the current key set. Values encoded under the old
    /// current set keep decoding until the next rotation.
    pub fn rotate_keys(&self, next: KeySet) {
        let fingerprint = next.fingerprint();
        self.codec.rotate(next);
        info!(%fingerprint, "rotated cookie keys");
    }

    pub fn replace_keys(&self, keys: KeyRing) {
        let fingerprint = keys.current().fingerprint();
        self.codec.replace_keys(keys);
        info!(%fingerprint, "replaced cookie key ring");
    }

    async fn start_session(
        &self,
        user_id: &str,
        origin: &str,
        remember: bool,
    ) -> Result<Cookie<'static>, GatekeeperError> {
        let token = Token::issue(
            TokenType::Authentication,
            user_id,
            origin,
            self.token_lifetime,
            Utc::now(),
        )
        .map_err(GatekeeperError::GenerateToken)?;

        self.store
            .add_token(&token)
            .await
            .map_err(GatekeeperError::AddToken)?;

        let value = self
            .codec
            .encode(&self.cookie.name, token.value())
            .map_err(GatekeeperError::CreateCookie)?;

        Ok(self.cookie.build(value, remember))
    }

    async fn hash(&self, password: &str) -> Result<String, GatekeeperError> {
        let password = Zeroizing::new(password.to_string());
        let params = self.hash_params;

        self.run_blocking(move || hash_password(&password, params))
            .await?
            .map_err(GatekeeperError::HashPassword)
    }

    async fn verify(&self, password: &str, record: &str) -> Result<bool, GatekeeperError> {
        let password = Zeroizing::new(password.to_string());
        let record = record.to_string();

        self.run_blocking(move || verify_password(&password, &record))
            .await?
            .map_err(GatekeeperError::HashPassword)
    }

    /// Runs an Argon2 computation on the blocking pool, bounded by the hash
    /// permits.
    ///
    /// The permit moves into the blocking task, so it stays taken until the
    /// computation finishes even if the caller's future is dropped.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, GatekeeperError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let permit = self
            .hash_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GatekeeperError::Worker(e.into()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|e| GatekeeperError::Worker(e.into()))
    }
}

impl<S: CredentialStore> Gatekeeper<S> {
    /// Authenticates an existing user and starts a session for them.
    ///
    /// Unknown emails still pay for one password verification.
    pub async fn log_user_in(
        &self,
        email: &str,
        password: &str,
        origin: &str,
        remember: bool,
    ) -> Result<Cookie<'static>, GatekeeperError> {
        let user = self
            .store
            .find_user(email)
            .await
            .map_err(GatekeeperError::FindUser)?;

        let Some(user) = user else {
            let dummy = self
                .dummy_record
                .get_or_try_init(|| self.hash(DUMMY_PASSWORD))
                .await?;
            let _ = self.verify(password, dummy).await;

            debug!("login rejected: unknown email");
            return Err(GatekeeperError::UserNotFound(email.to_string()));
        };

        if !self.verify(password, &user.password_hash).await? {
            debug!(user_id = %user.id, "login rejected: wrong password");
            return Err(GatekeeperError::InvalidCredentials);
        }

        let cookie = self.start_session(&user.id, origin, remember).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(cookie)
    }
}

fn to_delta(name: &'static str, lifetime: std::time::Duration) -> Result<TimeDelta, ConfigError> {
    TimeDelta::from_std(lifetime).map_err(|_| ConfigError::Invalid {
        name,
        reason: "out of range".to_string(),
    })
}

/// Default location of the operator key file.
pub fn default_key_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "gatekeeper")
        .context("could not determine platform directories")?;

    Ok(project_dirs.config_dir().join("keys.json"))
}
