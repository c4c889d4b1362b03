//! Collaborators the core consumes: clock, randomness, OTP hashing and delivery.
//!
//! Each is a small trait so tests can inject deterministic time and codes.
//! [`CoreContext`] bundles them together with the current settings snapshot and
//! is passed to every operation alongside the database connection.

use crate::config::settings::Settings;
use chrono::{DateTime, Utc};
use rand::{Rng, RngCore, distributions::Alphanumeric};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use std::sync::Arc;
use tracing::info;

/// Source of the current time. All timestamps are UTC.
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cryptographically secure randomness.
pub trait RandomSource: Send + Sync {
    /// `len` decimal digits
    fn numeric_code(&self, len: usize) -> String;
    /// Unguessable URL-safe identifier
    fn token(&self) -> String;
    /// Uniform integer in `0..upper`
    fn below(&self, upper: u32) -> u32;
}

/// Randomness from the thread-local CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

const TOKEN_LENGTH: usize = 43;

impl RandomSource for OsRandom {
    fn numeric_code(&self, len: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    fn token(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    fn below(&self, upper: u32) -> u32 {
        rand::thread_rng().gen_range(0..upper.max(1))
    }
}

/// One-way hashing for OTP codes.
pub trait OtpHasher: Send + Sync {
    /// Hash suitable for storage
    fn hash(&self, code: &str) -> String;
    /// Whether `code` produced `stored`
    fn verify(&self, code: &str, stored: &str) -> bool;
}

/// SHA-256 over `pepper || salt || code`, stored as `salt$digest`.
///
/// Every hash gets a fresh 16-byte salt.
#[derive(Debug, Clone, Default)]
pub struct SaltedSha256 {
    pepper: String,
}

impl SaltedSha256 {
    /// Hasher with an application-wide pepper
    #[must_use]
    pub fn new(pepper: impl Into<String>) -> Self {
        Self {
            pepper: pepper.into(),
        }
    }

    fn digest(&self, salt: &str, code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.pepper.as_bytes());
        hasher.update(salt.as_bytes());
        hasher.update(code.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl OtpHasher for SaltedSha256 {
    fn hash(&self, code: &str) -> String {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = hex::encode(salt);
        let digest = self.digest(&salt, code);
        format!("{salt}${digest}")
    }

    fn verify(&self, code: &str, stored: &str) -> bool {
        stored.split_once('$').is_some_and(|(salt, digest)| {
            self.digest(salt, code)
                .as_bytes()
                .ct_eq(digest.as_bytes())
                .into()
        })
    }
}

/// Outbound delivery of codes and alerts.
///
/// Delivery is fire-and-forget: nothing in the core depends on it succeeding.
pub trait DeliverySink: Send + Sync {
    /// Hand `payload` to the transport for `recipient`
    fn deliver(&self, recipient: &str, payload: &str);
}

/// Sink that only records the hand-off in the log. The payload is not logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DeliverySink for TracingSink {
    fn deliver(&self, recipient: &str, payload: &str) {
        info!(
            "Queued delivery to {} ({} bytes)",
            recipient,
            payload.len()
        );
    }
}

/// Everything an operation needs besides the database connection.
#[derive(Clone)]
pub struct CoreContext {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Randomness for codes, ids and puzzles
    pub random: Arc<dyn RandomSource>,
    /// OTP hashing
    pub hasher: Arc<dyn OtpHasher>,
    /// Outbound delivery
    pub sink: Arc<dyn DeliverySink>,
    /// Settings snapshot for this request
    pub settings: Arc<Settings>,
}

impl CoreContext {
    /// Production wiring: wall clock, OS randomness, salted SHA-256, log-only sink.
    #[must_use]
    pub fn production(settings: Arc<Settings>, pepper: impl Into<String>) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            random: Arc::new(OsRandom),
            hasher: Arc::new(SaltedSha256::new(pepper)),
            sink: Arc::new(TracingSink),
            settings,
        }
    }

    /// Shorthand for `self.clock.now()`
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl std::fmt::Debug for CoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreContext")
            .field("now", &self.clock.now())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
