//! Authenticated, encrypted cookie values that survive key rotation.
//!
//! Wire format of an encoded value:
//! ```text
//! base64url( FORMAT (1) | TIMESTAMP (8) | NONCE (24) | CIPHERTEXT | TAG (32) )
//! ```
//! The ciphertext is XChaCha20-Poly1305 over the JSON payload with the
//! cookie name as associated data. The tag is HMAC-SHA256 over
//! `name | "|" | FORMAT..CIPHERTEXT`. New values always use the current key
//! set; decoding walks the key ring newest first.

use anyhow::{Context, bail};
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use zeroize::Zeroizing;

use crate::crypto::{self, NONCE_LEN, TAG_LEN};
use crate::error::CookieError;
use crate::keys::{KeyRing, KeySet};

/// Longest encoded value accepted for decoding.
pub const MAX_ENCODED_LEN: usize = 4096;

const FORMAT_V1: u8 = 1;
const TIMESTAMP_LEN: usize = 8;
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN + NONCE_LEN;
const NAME_SEPARATOR: &[u8] = b"|";
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub struct KeyedCookieCodec {
    keys: RwLock<Arc<KeyRing>>,
    max_age: Duration,
}

impl KeyedCookieCodec {
    pub fn new(keys: KeyRing) -> Self {
        Self {
            keys: RwLock::new(Arc::new(keys)),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Snapshot of the key ring in use.
    pub fn keys(&self) -> Arc<KeyRing> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps the whole key ring.
    pub fn replace_keys(&self, keys: KeyRing) {
        *self.keys.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(keys);
    }

    /// Makes `next` current and demotes the old current to previous.
    pub fn rotate(&self, next: KeySet) {
        let mut guard = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(guard.rotate(next));
    }

    pub fn encode<T>(&self, name: &str, value: &T) -> Result<String, CookieError>
    where
        T: Serialize + ?Sized,
    {
        self.encode_at(name, value, Utc::now())
    }

    pub(crate) fn encode_at<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
        now: DateTime<Utc>,
    ) -> Result<String, CookieError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(value)
                .context("failed to serialize cookie value")
                .map_err(CookieError::Encode)?,
        );
        let keys = self.keys();

        seal(keys.current(), name, &plaintext, now).map_err(CookieError::Encode)
    }

    /// Decodes a value produced by [`KeyedCookieCodec::encode`] under any
    /// key set still in the ring.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, encoded: &str) -> Result<T, CookieError> {
        if encoded.is_empty() || encoded.len() > MAX_ENCODED_LEN {
            return Err(CookieError::Decode);
        }
        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CookieError::Decode)?;
        if raw.len() < HEADER_LEN + TAG_LEN {
            return Err(CookieError::Decode);
        }

        let keys = self.keys();
        let (timestamp, plaintext) = keys
            .generations()
            .iter()
            .find_map(|set| open(set, name, &raw))
            .ok_or(CookieError::Decode)?;

        if self.is_too_old(timestamp, Utc::now()) {
            return Err(CookieError::Decode);
        }

        serde_json::from_slice(&plaintext).map_err(|_| CookieError::Decode)
    }

    fn is_too_old(&self, timestamp: i64, now: DateTime<Utc>) -> bool {
        let age = now.timestamp().saturating_sub(timestamp);
        age > 0 && age as u64 > self.max_age.as_secs()
    }
}

fn seal(keys: &KeySet, name: &str, plaintext: &[u8], now: DateTime<Utc>) -> anyhow::Result<String> {
    if name.is_empty() {
        bail!("cookie name cannot be empty");
    }
    let (ciphertext, nonce) = crypto::encrypt(keys.block_key(), plaintext, name.as_bytes())?;

    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
    body.push(FORMAT_V1);
    body.extend_from_slice(&now.timestamp().to_be_bytes());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&ciphertext);

    let tag = crypto::sign(
        keys.hash_key(),
        &[name.as_bytes(), NAME_SEPARATOR, body.as_slice()],
    )?;
    body.extend_from_slice(&tag);

    let encoded = URL_SAFE_NO_PAD.encode(body);
    if encoded.len() > MAX_ENCODED_LEN {
        bail!("encoded cookie value is too long");
    }
    Ok(encoded)
}

fn open(keys: &KeySet, name: &str, raw: &[u8]) -> Option<(i64, Zeroizing<Vec<u8>>)> {
    let (body, tag) = raw.split_at(raw.len() - TAG_LEN);
    if !crypto::verify(keys.hash_key(), &[name.as_bytes(), NAME_SEPARATOR, body], tag) {
        return None;
    }
    if body[0] != FORMAT_V1 {
        return None;
    }

    let timestamp = i64::from_be_bytes(body[1..1 + TIMESTAMP_LEN].try_into().ok()?);
    let nonce = &body[1 + TIMESTAMP_LEN..HEADER_LEN];
    let ciphertext = &body[HEADER_LEN..];
    let plaintext = crypto::decrypt(keys.block_key(), nonce, ciphertext, name.as_bytes()).ok()?;

    Some((timestamp, plaintext))
}

/// Attributes of the transport cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub domain: String,
    pub same_site: SameSite,
    /// Lifetime of a remembered cookie.
    pub lifetime: Duration,
}

impl CookieSettings {
    /// Builds the cookie carrying `value`. It only gets an expiry when
    /// `remember` is set; otherwise it lasts for the browser session.
    pub fn build(&self, value: String, remember: bool) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(true)
            .same_site(self.same_site);

        if !self.domain.is_empty() {
            builder = builder.domain(self.domain.clone());
        }
        if remember {
            builder = builder.expires(time::OffsetDateTime::now_utc() + self.lifetime);
        }

        builder.build()
    }
}
