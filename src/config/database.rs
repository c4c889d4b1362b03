//! Database configuration module.
//!
//! Handles the `SQLite` connection and table creation using `SeaORM`. Tables are
//! generated from the entity definitions with `Schema::create_table_from_entity`,
//! so unique columns and foreign keys follow the Rust structs without hand-written
//! DDL. Creation order respects the foreign keys between tables.

use crate::entities::{
    Admin, AdminNotification, CaptchaChallenge, EmailVerificationOtp, OtpSendLog, Product,
    Setting, Signal, Subscription, Transaction, User,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/signal_desk.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a local `SQLite` file if no environment variable is set; the
/// file's directory is created when missing.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if let Some(parent) = database_url
        .strip_prefix("sqlite://")
        .and_then(|rest| rest.split('?').next())
        .and_then(|path| std::path::Path::new(path).parent())
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }
    Ok(())
}

/// Creates all tables (and declared indexes) if they do not exist yet.
///
/// Parents are created before children so the generated foreign keys resolve:
/// users, admins and products first, then subscriptions, transactions and signals.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Admin).await?;
    create_table(db, &schema, Product).await?;
    create_table(db, &schema, Subscription).await?;
    create_table(db, &schema, Transaction).await?;
    create_table(db, &schema, Signal).await?;
    create_table(db, &schema, Setting).await?;
    create_table(db, &schema, EmailVerificationOtp).await?;
    create_table(db, &schema, CaptchaChallenge).await?;
    create_table(db, &schema, OtpSendLog).await?;
    create_table(db, &schema, AdminNotification).await?;

    info!("Database tables ensured.");
    Ok(())
}
