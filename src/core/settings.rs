//! Settings store - key/value rows in the `settings` table.
//!
//! Writes are last-write-wins upserts. Every write through [`set_setting_value`]
//! reloads the [`SettingsCache`] so the next snapshot reflects it.

use crate::{
    config::settings::{Settings, SettingsCache},
    entities::{Setting, setting},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Set, prelude::*, sea_query::OnConflict};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Retrieves a raw value from the `settings` table.
///
/// Returns `Ok(None)` if the key does not exist.
#[instrument(skip(db))]
pub async fn get_setting_value<C: ConnectionTrait>(db: &C, key: &str) -> Result<Option<String>> {
    let value = Setting::find()
        .filter(setting::Column::Key.eq(key))
        .one(db)
        .await?
        .map(|row| row.value);
    debug!("Setting '{}' present: {}", key, value.is_some());
    Ok(value)
}

/// Retrieves a value, falling back to `default` when the key is missing.
pub async fn get_setting_or<C: ConnectionTrait>(db: &C, key: &str, default: &str) -> Result<String> {
    Ok(get_setting_value(db, key)
        .await?
        .unwrap_or_else(|| default.to_string()))
}

/// Sets or updates a value and refreshes the cached snapshot.
///
/// # Errors
/// Returns `Error::Validation` for an empty key, or a database error.
#[instrument(skip(db, cache, value))]
pub async fn set_setting_value(
    db: &DatabaseConnection,
    cache: &SettingsCache,
    key: &str,
    value: &str,
    now: DateTime<Utc>,
) -> Result<Arc<Settings>> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::validation("Setting key cannot be empty"));
    }

    let row = setting::ActiveModel {
        key: Set(key.to_string()),
        value: Set(value.to_string()),
        updated_at: Set(now),
        ..Default::default()
    };
    Setting::insert(row)
        .on_conflict(
            OnConflict::column(setting::Column::Key)
                .update_columns([setting::Column::Value, setting::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    info!("Setting '{}' updated", key);

    cache.reload(db).await
}
