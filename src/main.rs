use signal_desk::{
    config::{database, settings},
    core::{collaborators::CoreContext, retention, subscription},
    errors::Result,
};
use dotenvy::dotenv;
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Maintenance runner: expires lapsed subscriptions and purges stale
/// verification data, then exits. Meant to be invoked by a scheduler.
#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();

    // 3. Load file defaults
    let file_config = settings::load_default_file_config()
        .inspect_err(|e| error!("Critical error loading configuration: {}", e))?;

    // 4. Initialize database and schema
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database schema ready."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Build the settings snapshot and context
    let cache = settings::SettingsCache::load(&db, file_config.verification).await?;
    let pepper = env::var("OTP_PEPPER").ok().or(file_config.otp_pepper).unwrap_or_else(|| {
        warn!("No OTP pepper configured; hashes rely on per-code salts only");
        String::new()
    });
    let ctx = CoreContext::production(cache.snapshot().await, pepper);

    // 6. Run the sweeps
    let now = ctx.now();
    let expired = subscription::sweep_expired_subscriptions(&db, now)
        .await
        .inspect_err(|e| error!("Expiry sweep failed: {}", e))?;
    let purged = retention::purge_stale_verification_data(&db, &ctx, now)
        .await
        .inspect_err(|e| error!("Retention sweep failed: {}", e))?;

    info!(
        "Maintenance complete: {} subscriptions expired, {} captchas, {} otps, {} send-log rows purged",
        expired, purged.captchas, purged.otps, purged.send_log
    );
    Ok(())
}
