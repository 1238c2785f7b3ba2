use thiserror::Error;

/// Failures while hashing or verifying a password.
///
/// A wrong password is not an error: [`crate::verify_password`] returns
/// `Ok(false)` for it. These variants describe records that cannot be
/// checked at all.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("OS random generator unavailable")]
    Entropy(#[source] anyhow::Error),
    #[error("failed to derive password hash")]
    Hashing(#[source] anyhow::Error),
    #[error("malformed password record")]
    Malformed(#[source] anyhow::Error),
    #[error("password record uses argon2 version {found:#x}, expected {expected:#x}")]
    UnsupportedAlgorithm { found: u32, expected: u32 },
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid key: expected '<hash key>$<block key>'")]
    MissingSeparator,
    #[error("invalid {0} key encoding")]
    Encoding(&'static str),
    #[error("hash key must be at least {minimum} bytes, got {actual}")]
    HashKeyTooShort { actual: usize, minimum: usize },
    #[error("block key must be exactly {expected} bytes, got {actual}")]
    BlockKeyLength { actual: usize, expected: usize },
    #[error("a key ring needs at least one key set")]
    EmptyRing,
    #[error("failed to generate {0} key")]
    Generate(&'static str, #[source] anyhow::Error),
}

/// Failures of the keyed cookie codec.
///
/// Decoding failures are deliberately opaque: a bad encoding, a tag that
/// matches no key and a failed decryption all look the same.
#[derive(Debug, Error)]
pub enum CookieError {
    #[error("failed to encode cookie value")]
    Encode(#[source] anyhow::Error),
    #[error("the cookie value could not be decoded")]
    Decode,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing setting {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Caller facing classification of a [`GatekeeperError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyExists,
    NotAuthenticated,
    Internal,
}

/// Errors produced by the gatekeeper workflows.
///
/// Each variant names the step that failed so operator logs stay precise;
/// [`GatekeeperError::kind`] collapses them for end users.
#[derive(Debug, Error)]
pub enum GatekeeperError {
    #[error("failed to find user by email")]
    FindUser(#[source] anyhow::Error),
    #[error("a user with the email {0} already exists")]
    UserAlreadyExists(String),
    #[error("no user with the email {0} exists")]
    UserNotFound(String),
    #[error("user's login credentials don't match")]
    InvalidCredentials,
    #[error("failed to hash user's password")]
    HashPassword(#[source] PasswordError),
    #[error("failed to add user to the store")]
    AddUser(#[source] anyhow::Error),
    #[error("failed to generate new token")]
    GenerateToken(#[source] anyhow::Error),
    #[error("failed to add token to the store")]
    AddToken(#[source] anyhow::Error),
    #[error("failed to fetch token from the store")]
    GetToken(#[source] anyhow::Error),
    #[error("failed to create an authentication cookie")]
    CreateCookie(#[source] CookieError),
    #[error("password hashing worker failed")]
    Worker(#[source] anyhow::Error),
}

impl GatekeeperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatekeeperError::UserAlreadyExists(_) => ErrorKind::AlreadyExists,
            GatekeeperError::UserNotFound(_) | GatekeeperError::InvalidCredentials => {
                ErrorKind::NotAuthenticated
            }
            // a stored record that cannot be checked still reads as bad credentials
            GatekeeperError::HashPassword(
                PasswordError::Malformed(_) | PasswordError::UnsupportedAlgorithm { .. },
            ) => ErrorKind::NotAuthenticated,
            _ => ErrorKind::Internal,
        }
    }
}
