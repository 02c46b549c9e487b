//! Replay nonce codec
//!
//! A nonce is a UTC timestamp in `YYYY-MM-DDTHH:MM:SSZ` form immediately
//! followed by an arbitrary salt, e.g. `2024-05-01T12:00:00ZUNIQUE`.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// `strftime` format of the timestamp prefix
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Length of the timestamp prefix
pub const TIME_STR_LEN: usize = 20;

/// Default accepted distance between a nonce timestamp and now (5 hours)
pub const DEFAULT_SKEW: Duration = Duration::from_secs(5 * 60 * 60);

const SALT_LEN: usize = 6;

/// Nonce parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NonceError {
    /// Shorter than the timestamp prefix
    #[error("nonce shorter than its timestamp")]
    TooShort,

    /// Timestamp prefix does not parse
    #[error("invalid nonce timestamp {0:?}")]
    InvalidTimestamp(String),
}

/// A parsed nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    timestamp: DateTime<Utc>,
    salt: String,
}

impl Nonce {
    /// Create a nonce with an explicit timestamp and salt
    pub fn new(timestamp: DateTime<Utc>, salt: impl Into<String>) -> Self {
        Self {
            timestamp,
            salt: salt.into(),
        }
    }

    /// Create a fresh nonce for `now` with a random alphanumeric salt
    pub fn generate_at(now: DateTime<Utc>) -> Self {
        let salt: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SALT_LEN)
            .map(char::from)
            .collect();
        Self::new(now, salt)
    }

    /// Parse the wire form
    ///
    /// # Errors
    ///
    /// Returns [`NonceError`] if the string does not start with a valid timestamp.
    pub fn parse(nonce: &str) -> Result<Self, NonceError> {
        let stamp = nonce.get(..TIME_STR_LEN).ok_or(NonceError::TooShort)?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIME_FORMAT)
            .map_err(|_| NonceError::InvalidTimestamp(stamp.to_string()))?
            .and_utc();
        Ok(Self {
            timestamp,
            salt: nonce[TIME_STR_LEN..].to_string(),
        })
    }

    /// Timestamp of the nonce
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Timestamp as seconds since the Unix epoch
    pub fn unix_timestamp(&self) -> i64 {
        self.timestamp.timestamp()
    }

    /// Salt following the timestamp
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Whether the timestamp lies within `skew` of `now`, in either direction
    pub fn is_within(&self, skew: Duration, now: DateTime<Utc>) -> bool {
        let skew = i64::try_from(skew.as_secs()).unwrap_or(i64::MAX);
        (now.timestamp() - self.unix_timestamp()).abs() <= skew
    }
}

impl FromStr for Nonce {
    type Err = NonceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.timestamp.format(TIME_FORMAT), self.salt)
    }
}

/// Split a nonce into its Unix timestamp and salt
///
/// # Errors
///
/// Returns [`NonceError`] if the nonce is malformed.
pub fn split_nonce(nonce: &str) -> Result<(i64, String), NonceError> {
    let parsed = Nonce::parse(nonce)?;
    Ok((parsed.unix_timestamp(), parsed.salt))
}

/// Mint a nonce for the current time
pub fn make_nonce() -> String {
    Nonce::generate_at(Utc::now()).to_string()
}
