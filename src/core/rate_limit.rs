//! OTP send rate limiter - Trailing-window count over the append-only send log.
//!
//! The count and the insert are one SQL statement: the new log row is written
//! only if fewer than the threshold rows exist for the email inside the window.
//! Concurrent requests for the same email therefore cannot both slip under the
//! limit, and a denied request appends nothing.

use crate::{
    core::collaborators::CoreContext,
    entities::{OtpSendLog, otp_send_log},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{Statement, prelude::*};
use tracing::{debug, warn};

const ADMIT_SEND_SQL: &str = "INSERT INTO otp_send_log (email, sent_at) \
     SELECT ?, ? \
     WHERE (SELECT COUNT(*) FROM otp_send_log WHERE email = ? AND sent_at >= ?) < ?";

fn window_start(ctx: &CoreContext, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::minutes(ctx.settings.otp_send_window_minutes)
}

/// Admits one send for `email`, appending a log row, or refuses.
///
/// `email` must already be normalised.
///
/// # Errors
/// Returns `Error::RateLimited` when the window already holds the maximum number
/// of sends for this email.
pub async fn admit_otp_send<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    email: &str,
) -> Result<()> {
    let now = ctx.now();
    let statement = Statement::from_sql_and_values(
        db.get_database_backend(),
        ADMIT_SEND_SQL,
        [
            email.into(),
            now.into(),
            email.into(),
            window_start(ctx, now).into(),
            i64::from(ctx.settings.otp_max_sends_per_window).into(),
        ],
    );
    let result = db.execute(statement).await?;

    if result.rows_affected() == 0 {
        warn!("OTP send rate limit reached for {}", email);
        return Err(Error::RateLimited {
            email: email.to_string(),
        });
    }
    debug!("OTP send admitted for {}", email);
    Ok(())
}

/// Sends logged for `email` inside the current window.
pub async fn sends_in_window<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    email: &str,
) -> Result<u64> {
    OtpSendLog::find()
        .filter(otp_send_log::Column::Email.eq(email))
        .filter(otp_send_log::Column::SentAt.gte(window_start(ctx, ctx.now())))
        .count(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{
        OTP_MAX_SENDS_PER_WINDOW, OTP_SEND_WINDOW_MINUTES, Settings, SettingsCache,
    };
    use crate::core::settings::set_setting_value;
    use crate::entities::setting;
    use crate::test_utils::*;
    use sea_orm::{ActiveModelTrait, Set};

    fn three_per_hour() -> Settings {
        Settings {
            otp_max_sends_per_window: 3,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_denied_send_appends_nothing() -> Result<()> {
        let env = setup_env_with(three_per_hour()).await?;
        let email = "bob@example.com";

        for _ in 0..3 {
            admit_otp_send(&env.db, &env.ctx, email).await?;
        }
        assert_eq!(sends_in_window(&env.db, &env.ctx, email).await?, 3);

        let denied = admit_otp_send(&env.db, &env.ctx, email).await;
        assert!(matches!(denied, Err(Error::RateLimited { .. })));
        assert_eq!(OtpSendLog::find().count(&env.db).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_limit_is_per_email() -> Result<()> {
        let env = setup_env_with(three_per_hour()).await?;
        for _ in 0..3 {
            admit_otp_send(&env.db, &env.ctx, "first@example.com").await?;
        }
        admit_otp_send(&env.db, &env.ctx, "second@example.com").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_window_slides() -> Result<()> {
        let env = setup_env_with(three_per_hour()).await?;
        let email = "carol@example.com";
        for _ in 0..3 {
            admit_otp_send(&env.db, &env.ctx, email).await?;
            env.clock.advance(Duration::minutes(10));
        }
        assert!(admit_otp_send(&env.db, &env.ctx, email).await.is_err());

        // First send was 30 minutes ago; move it out of the 60 minute window
        env.clock.advance(Duration::minutes(31));
        admit_otp_send(&env.db, &env.ctx, email).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_limits_follow_settings_table() -> Result<()> {
        let env = setup_env().await?;
        let email = "erin@example.com";
        for (key, value) in [(OTP_MAX_SENDS_PER_WINDOW, "2"), (OTP_SEND_WINDOW_MINUTES, "10")] {
            setting::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value.to_string()),
                updated_at: Set(fixed_now()),
                ..Default::default()
            }
            .insert(&env.db)
            .await?;
        }

        let cache = SettingsCache::load(&env.db, Settings::default()).await?;
        let ctx = CoreContext {
            settings: cache.snapshot().await,
            ..env.ctx.clone()
        };
        admit_otp_send(&env.db, &ctx, email).await?;
        admit_otp_send(&env.db, &ctx, email).await?;
        let denied = admit_otp_send(&env.db, &ctx, email).await;
        assert!(matches!(denied, Err(Error::RateLimited { .. })));

        // The 10 minute window has passed
        env.clock.advance(Duration::minutes(11));
        admit_otp_send(&env.db, &ctx, email).await?;

        // Raising the threshold takes effect on the reloaded snapshot only
        let reloaded =
            set_setting_value(&env.db, &cache, OTP_MAX_SENDS_PER_WINDOW, "3", ctx.now()).await?;
        admit_otp_send(&env.db, &ctx, email).await?;
        assert!(admit_otp_send(&env.db, &ctx, email).await.is_err());

        let ctx = CoreContext {
            settings: reloaded,
            ..env.ctx.clone()
        };
        admit_otp_send(&env.db, &ctx, email).await?;
        assert!(admit_otp_send(&env.db, &ctx, email).await.is_err());
        assert_eq!(sends_in_window(&env.db, &ctx, email).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_sends_respect_threshold() -> Result<()> {
        let env = setup_env_with(Settings {
            otp_max_sends_per_window: 1,
            ..Settings::default()
        })
        .await?;
        let email = "dave@example.com";

        let (a, b) = tokio::join!(
            admit_otp_send(&env.db, &env.ctx, email),
            admit_otp_send(&env.db, &env.ctx, email),
        );

        assert!(a.is_ok() != b.is_ok());
        assert_eq!(OtpSendLog::find().count(&env.db).await?, 1);
        Ok(())
    }
}
