//! Persistence boundary for users and tokens.
//!
//! The gatekeeper never talks to a database directly. Applications implement
//! [`TokenStore`] (and [`CredentialStore`] when they want password login) on
//! top of whatever storage engine they use. [`MemoryStore`] is a complete
//! in-process implementation for tests and local tooling.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::token::Token;

/// The four operations the gatekeeper needs from persistence.
///
/// Failures are reported as-is; the gatekeeper adds the step that failed.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns `true` when a user with this email is registered.
    async fn user_exists(&self, email: &str) -> Result<bool>;

    /// Registers a user and returns the identifier the store assigned.
    async fn add_user(&self, email: &str, password_hash: &str) -> Result<String>;

    async fn add_token(&self, token: &Token) -> Result<()>;

    /// Looks a token up by its value. Unknown values yield `Ok(None)`.
    async fn get_token(&self, value: &str) -> Result<Option<Token>>;
}

/// A registered user as far as the gatekeeper is concerned.
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Extension needed to log existing users in.
#[async_trait]
pub trait CredentialStore: TokenStore {
    async fn find_user(&self, email: &str) -> Result<Option<UserRecord>>;
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("user '{0}' already exists")]
    UserAlreadyExists(String),
    #[error("token already exists")]
    TokenAlreadyExists,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRecord>,
    tokens: HashMap<String, Token>,
    next_id: u64,
    writes: usize,
}

/// In-memory [`TokenStore`] and [`CredentialStore`].
///
/// Counts successful writes so callers can check that a rejected workflow
/// left the store untouched.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Number of successful `add_user` and `add_token` calls.
    pub fn writes(&self) -> usize {
        self.lock().map(|inner| inner.writes).unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.lock().map(|inner| inner.users.len()).unwrap_or_default()
    }

    pub fn token_count(&self) -> usize {
        self.lock().map(|inner| inner.tokens.len()).unwrap_or_default()
    }

    /// Stores a token as-is, bypassing the gatekeeper. Handy for seeding
    /// expired or foreign tokens.
    pub fn insert_token(&self, token: Token) -> Result<()> {
        let mut inner = self.lock()?;
        inner.tokens.insert(token.value().to_string(), token);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn user_exists(&self, email: &str) -> Result<bool> {
        Ok(self.lock()?.users.contains_key(email))
    }

    async fn add_user(&self, email: &str, password_hash: &str) -> Result<String> {
        let mut inner = self.lock()?;
        if inner.users.contains_key(email) {
            return Err(MemoryStoreError::UserAlreadyExists(email.to_string()).into());
        }

        inner.next_id += 1;
        let id = inner.next_id.to_string();
        inner.users.insert(
            email.to_string(),
            UserRecord {
                id: id.clone(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
        inner.writes += 1;
        Ok(id)
    }

    async fn add_token(&self, token: &Token) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.tokens.contains_key(token.value()) {
            return Err(MemoryStoreError::TokenAlreadyExists.into());
        }

        inner
            .tokens
            .insert(token.value().to_string(), token.clone());
        inner.writes += 1;
        Ok(())
    }

    async fn get_token(&self, value: &str) -> Result<Option<Token>> {
        Ok(self.lock()?.tokens.get(value).cloned())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.lock()?.users.get(email).cloned())
    }
}
