use anyhow::{Result, bail};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use crate::crypto;

/// Random bytes behind every token value.
pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Authentication,
    EmailReset,
}

impl TokenType {
    /// Name used when persisting the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Authentication => "authentication",
            TokenType::EmailReset => "email",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "authentication" => Ok(TokenType::Authentication),
            "email" | "email_reset" => Ok(TokenType::EmailReset),
            other => bail!("invalid token type '{other}'"),
        }
    }
}

/// A persisted credential: an authentication session or a password reset.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    value: String,
    token_type: TokenType,
    valid_until: DateTime<Utc>,
    user_id: String,
    origin: String,
}

impl Token {
    /// Rebuilds a token read back from a store.
    pub fn new(
        value: impl Into<String>,
        token_type: TokenType,
        valid_until: DateTime<Utc>,
        user_id: impl Into<String>,
        origin: impl Into<String>,
    ) -> Result<Self> {
        let value = value.into();
        let user_id = user_id.into();

        if value.is_empty() {
            bail!("token cannot be empty");
        }
        if user_id.is_empty() {
            bail!("user id cannot be empty");
        }

        Ok(Self {
            value,
            token_type,
            valid_until,
            user_id,
            origin: origin.into(),
        })
    }

    /// Creates a fresh token with a random value that expires `lifetime`
    /// after `now`.
    pub(crate) fn issue(
        token_type: TokenType,
        user_id: &str,
        origin: &str,
        lifetime: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let valid_until = now
            .checked_add_signed(lifetime)
            .filter(|until| *until > now)
            .ok_or_else(|| anyhow::anyhow!("token expiry must lie in the future"))?;

        Self::new(generate_value()?, token_type, valid_until, user_id, origin)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn valid_until(&self) -> DateTime<Utc> {
        self.valid_until
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Network address the token was issued to.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// A token expiring exactly at `now` is already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    /// Checks that this token is the one presented, has the expected type and
    /// has not expired.
    pub fn is_valid(&self, presented: &str, expected: TokenType, now: DateTime<Utc>) -> bool {
        if self.value.is_empty() {
            return false;
        }
        let same_value = bool::from(self.value.as_bytes().ct_eq(presented.as_bytes()));

        same_value && self.token_type == expected && !self.is_expired_at(now)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("valid_until", &self.valid_until)
            .field("user_id", &self.user_id)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Generate an unguessable, URL safe token value.
pub fn generate_value() -> Result<String> {
    let bytes = crypto::random_bytes(TOKEN_BYTES)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
