//! Verification settings: file defaults, database overrides and the cached snapshot.
//!
//! Defaults come from `config.toml` (or built-in values when the file is absent).
//! Rows in the `settings` table override them key by key. The merged result is an
//! immutable [`Settings`] snapshot; [`SettingsCache`] hands out `Arc`s of the
//! current snapshot and swaps in a new one on [`SettingsCache::reload`].

use crate::entities::{Setting, SettingModel};
use crate::errors::{Error, Result};
use sea_orm::{ConnectionTrait, EntityTrait};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Key: maximum OTP sends per email within the trailing window
pub const OTP_MAX_SENDS_PER_WINDOW: &str = "otp_max_sends_per_window";
/// Key: length of the rate-limit window in minutes
pub const OTP_SEND_WINDOW_MINUTES: &str = "otp_send_window_minutes";
/// Key: OTP lifetime in minutes
pub const OTP_EXPIRY_MINUTES: &str = "otp_expiry_minutes";
/// Key: verification attempts allowed per issued code
pub const OTP_MAX_ATTEMPTS: &str = "otp_max_attempts";
/// Key: minimum seconds between two sends to the same email
pub const OTP_RESEND_COOLDOWN_SECONDS: &str = "otp_resend_cooldown_seconds";
/// Key: CAPTCHA lifetime in minutes
pub const CAPTCHA_EXPIRY_MINUTES: &str = "captcha_expiry_minutes";
/// Key: how long send-log rows are kept
pub const SEND_LOG_RETENTION_HOURS: &str = "send_log_retention_hours";
/// Key: minutes a successful OTP verification stays usable for registration
pub const VERIFICATION_FRESHNESS_MINUTES: &str = "verification_freshness_minutes";
/// Key: whether closing a signal raises a staff notification
pub const NOTIFY_ON_SIGNAL_CLOSE: &str = "notify_on_signal_close";

/// Immutable snapshot of the process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sends admitted per email inside the window
    pub otp_max_sends_per_window: u32,
    /// Trailing window for the send limiter
    pub otp_send_window_minutes: i64,
    /// OTP lifetime
    pub otp_expiry_minutes: i64,
    /// Attempts allowed before a code is exhausted
    pub otp_max_attempts: i32,
    /// Minimum gap between sends to one email
    pub otp_resend_cooldown_seconds: i64,
    /// CAPTCHA lifetime
    pub captcha_expiry_minutes: i64,
    /// Send-log retention
    pub send_log_retention_hours: i64,
    /// How long a verified email may be registered
    pub verification_freshness_minutes: i64,
    /// Raise a notification when a signal closes
    pub notify_on_signal_close: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            otp_max_sends_per_window: 5,
            otp_send_window_minutes: 60,
            otp_expiry_minutes: 5,
            otp_max_attempts: 5,
            otp_resend_cooldown_seconds: 30,
            captcha_expiry_minutes: 2,
            send_log_retention_hours: 24,
            verification_freshness_minutes: 15,
            notify_on_signal_close: true,
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, raw: &str, fallback: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("Ignoring unparseable value for setting '{}'", key);
        fallback
    })
}

fn positive_or<T: PartialOrd + Default + Copy>(value: T, fallback: T) -> T {
    if value > T::default() { value } else { fallback }
}

impl Settings {
    /// Applies `settings` table rows on top of `self`.
    ///
    /// Unknown keys are ignored. Values that do not parse, or that would disable a
    /// limit (zero or negative), keep the default.
    #[must_use]
    pub fn with_overrides(&self, rows: &[SettingModel]) -> Self {
        let mut merged = self.clone();
        for row in rows {
            let raw = row.value.as_str();
            match row.key.as_str() {
                OTP_MAX_SENDS_PER_WINDOW => {
                    merged.otp_max_sends_per_window = positive_or(
                        parse_or(&row.key, raw, self.otp_max_sends_per_window),
                        self.otp_max_sends_per_window,
                    );
                }
                OTP_SEND_WINDOW_MINUTES => {
                    merged.otp_send_window_minutes = positive_or(
                        parse_or(&row.key, raw, self.otp_send_window_minutes),
                        self.otp_send_window_minutes,
                    );
                }
                OTP_EXPIRY_MINUTES => {
                    merged.otp_expiry_minutes = positive_or(
                        parse_or(&row.key, raw, self.otp_expiry_minutes),
                        self.otp_expiry_minutes,
                    );
                }
                OTP_MAX_ATTEMPTS => {
                    merged.otp_max_attempts = positive_or(
                        parse_or(&row.key, raw, self.otp_max_attempts),
                        self.otp_max_attempts,
                    );
                }
                OTP_RESEND_COOLDOWN_SECONDS => {
                    merged.otp_resend_cooldown_seconds = parse_or(
                        &row.key,
                        raw,
                        self.otp_resend_cooldown_seconds,
                    )
                    .max(0);
                }
                CAPTCHA_EXPIRY_MINUTES => {
                    merged.captcha_expiry_minutes = positive_or(
                        parse_or(&row.key, raw, self.captcha_expiry_minutes),
                        self.captcha_expiry_minutes,
                    );
                }
                SEND_LOG_RETENTION_HOURS => {
                    merged.send_log_retention_hours = positive_or(
                        parse_or(&row.key, raw, self.send_log_retention_hours),
                        self.send_log_retention_hours,
                    );
                }
                VERIFICATION_FRESHNESS_MINUTES => {
                    merged.verification_freshness_minutes = positive_or(
                        parse_or(&row.key, raw, self.verification_freshness_minutes),
                        self.verification_freshness_minutes,
                    );
                }
                NOTIFY_ON_SIGNAL_CLOSE => {
                    merged.notify_on_signal_close =
                        parse_or(&row.key, raw, self.notify_on_signal_close);
                }
                _ => {}
            }
        }
        merged
    }
}

/// Structure of `config.toml`
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Defaults for the verification pipeline
    #[serde(default)]
    pub verification: Settings,
    /// Application-wide pepper mixed into OTP hashes
    #[serde(default)]
    pub otp_pepper: Option<String>,
}

/// Loads `config.toml`-style defaults from `path`.
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_file_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads the config named by `SIGNAL_DESK_CONFIG` (default `./config.toml`).
///
/// A missing file yields built-in defaults; a present but invalid file is an error.
pub fn load_default_file_config() -> Result<FileConfig> {
    let path = std::env::var("SIGNAL_DESK_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        debug!("Loading configuration from {}", path);
        load_file_config(&path)
    } else {
        info!("No config file at {}, using built-in defaults", path);
        Ok(FileConfig::default())
    }
}

/// Read-mostly holder of the current [`Settings`] snapshot.
#[derive(Debug)]
pub struct SettingsCache {
    defaults: Settings,
    current: RwLock<Arc<Settings>>,
}

impl SettingsCache {
    /// Builds the cache from `defaults` merged with the `settings` table.
    pub async fn load<C: ConnectionTrait>(db: &C, defaults: Settings) -> Result<Self> {
        let rows = Setting::find().all(db).await?;
        let snapshot = Arc::new(defaults.with_overrides(&rows));
        Ok(Self {
            defaults,
            current: RwLock::new(snapshot),
        })
    }

    /// Current snapshot; cheap to clone and hand to request contexts.
    pub async fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&*self.current.read().await)
    }

    /// Re-reads the `settings` table and replaces the snapshot.
    pub async fn reload<C: ConnectionTrait>(&self, db: &C) -> Result<Arc<Settings>> {
        let rows = Setting::find().all(db).await?;
        let snapshot = Arc::new(self.defaults.with_overrides(&rows));
        let mut writer = self.current.write().await;
        *writer = Arc::clone(&snapshot);
        info!("Settings cache reloaded from {} rows", rows.len());
        Ok(snapshot)
    }
}
