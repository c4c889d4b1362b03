//! Shared test utilities for the signal desk core.
//!
//! This module provides an in-memory database, a deterministic [`CoreContext`]
//! and fixture helpers that insert rows with sensible defaults.

use crate::{
    config::settings::Settings,
    core::collaborators::{Clock, CoreContext, DeliverySink, RandomSource, SaltedSha256},
    entities::{AdminRole, admin, product, user},
    errors::Result,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

/// Code produced by [`FixedRandom::numeric_code`]
pub const TEST_OTP_CODE: &str = "123456";
/// Question produced by [`FixedRandom`] operands (4 + 1 each)
pub const TEST_CAPTCHA_QUESTION: &str = "5 + 5";
/// Answer to [`TEST_CAPTCHA_QUESTION`]
pub const TEST_CAPTCHA_ANSWER: &str = "10";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Fixed starting instant for every test clock: 2026-01-15 10:00:00 UTC
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Starts the clock at `start`
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jumps to `instant`
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    /// Moves forward by `step`
    pub fn advance(&self, step: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += step;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deterministic randomness: a constant OTP code, distinct tokens, fixed operands.
#[derive(Debug, Default)]
pub struct FixedRandom {
    counter: AtomicU64,
}

impl RandomSource for FixedRandom {
    fn numeric_code(&self, len: usize) -> String {
        TEST_OTP_CODE.chars().cycle().take(len).collect()
    }

    fn token(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("test-token-{n:032}")
    }

    fn below(&self, upper: u32) -> u32 {
        4.min(upper.saturating_sub(1))
    }
}

/// Sink that keeps every delivery for inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    /// All `(recipient, payload)` pairs delivered so far
    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeliverySink for RecordingSink {
    fn deliver(&self, recipient: &str, payload: &str) {
        self.deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((recipient.to_string(), payload.to_string()));
    }
}

/// Database plus deterministic collaborators.
pub struct TestEnv {
    /// Fresh in-memory database
    pub db: DatabaseConnection,
    /// Context wired to the test doubles below
    pub ctx: CoreContext,
    /// The context's clock, for moving time
    pub clock: Arc<ManualClock>,
    /// The context's sink, for asserting deliveries
    pub sink: Arc<RecordingSink>,
}

/// Test environment with default settings.
pub async fn setup_env() -> Result<TestEnv> {
    setup_env_with(Settings::default()).await
}

/// Test environment with custom settings.
pub async fn setup_env_with(settings: Settings) -> Result<TestEnv> {
    let db = setup_test_db().await?;
    let clock = Arc::new(ManualClock::new(fixed_now()));
    let sink = Arc::new(RecordingSink::default());
    let ctx = CoreContext {
        clock: clock.clone(),
        random: Arc::new(FixedRandom::default()),
        hasher: Arc::new(SaltedSha256::new("test-pepper")),
        sink: sink.clone(),
        settings: Arc::new(settings),
    };
    Ok(TestEnv {
        db,
        ctx,
        clock,
        sink,
    })
}

/// Inserts a verified, active user directly.
///
/// # Defaults
/// * `full_name`: "Test User"
/// * `password_hash`: "hash"
pub async fn create_test_user(env: &TestEnv, email: &str, mobile: &str) -> Result<user::Model> {
    let row = user::ActiveModel {
        full_name: Set("Test User".to_string()),
        mobile: Set(mobile.to_string()),
        email: Set(email.to_string()),
        password_hash: Set("hash".to_string()),
        email_verified: Set(true),
        is_active: Set(true),
        created_at: Set(env.ctx.now()),
        ..Default::default()
    };
    Ok(row.insert(&env.db).await?)
}

/// Inserts an active admin. `category` is the product name a staff admin is scoped to.
pub async fn create_test_admin(
    env: &TestEnv,
    username: &str,
    role: AdminRole,
    category: Option<&str>,
) -> Result<admin::Model> {
    let row = admin::ActiveModel {
        username: Set(username.to_string()),
        email: Set(format!("{username}@desk.example.com")),
        password_hash: Set("hash".to_string()),
        role: Set(role),
        product_category: Set(category.map(str::to_string)),
        is_active: Set(true),
        created_at: Set(env.ctx.now()),
        ..Default::default()
    };
    Ok(row.insert(&env.db).await?)
}

/// Inserts a superadmin named `root`.
pub async fn create_test_superadmin(env: &TestEnv) -> Result<admin::Model> {
    create_test_admin(env, "root", AdminRole::Superadmin, None).await
}

/// Inserts an active product.
pub async fn create_test_product(
    env: &TestEnv,
    name: &str,
    price: Decimal,
    duration_days: i32,
) -> Result<product::Model> {
    let now = env.ctx.now();
    let row = product::ActiveModel {
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        duration_days: Set(duration_days),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    Ok(row.insert(&env.db).await?)
}

#[test]
fn test_manual_clock_moves_only_when_told() {
    let clock = ManualClock::new(fixed_now());
    assert_eq!(clock.now(), fixed_now());
    clock.advance(Duration::minutes(5));
    assert_eq!(clock.now(), fixed_now() + Duration::minutes(5));
    clock.set(fixed_now());
    assert_eq!(clock.now(), fixed_now());
}
