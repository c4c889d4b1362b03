//! Retention sweep for verification data.
//!
//! Removes expired CAPTCHA challenges, expired unverified OTP rows and send-log
//! rows older than the retention horizon. Verified OTP rows stay for audit.

use crate::{
    core::collaborators::CoreContext,
    entities::{
        CaptchaChallenge, EmailVerificationOtp, OtpSendLog, captcha_challenge,
        email_verification_otp, otp_send_log,
    },
    errors::Result,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::prelude::*;
use tracing::{info, instrument};

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Expired CAPTCHA challenges
    pub captchas: u64,
    /// Expired, never-verified OTP rows
    pub otps: u64,
    /// Send-log rows past retention
    pub send_log: u64,
}

/// Deletes stale verification rows as of `now`.
///
/// The send-log horizon is never shorter than the rate-limit window, so the
/// sweep cannot loosen the limiter.
#[instrument(skip(db, ctx))]
pub async fn purge_stale_verification_data<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    now: DateTime<Utc>,
) -> Result<RetentionReport> {
    let captchas = CaptchaChallenge::delete_many()
        .filter(captcha_challenge::Column::CaptchaExpiresAt.lte(now))
        .exec(db)
        .await?
        .rows_affected;

    let otps = EmailVerificationOtp::delete_many()
        .filter(email_verification_otp::Column::OtpExpiresAt.lte(now))
        .filter(email_verification_otp::Column::EmailVerified.eq(false))
        .exec(db)
        .await?
        .rows_affected;

    let horizon = Duration::hours(ctx.settings.send_log_retention_hours)
        .max(Duration::minutes(ctx.settings.otp_send_window_minutes));
    let send_log = OtpSendLog::delete_many()
        .filter(otp_send_log::Column::SentAt.lt(now - horizon))
        .exec(db)
        .await?
        .rows_affected;

    let report = RetentionReport {
        captchas,
        otps,
        send_log,
    };
    info!(
        "Retention sweep removed {} captchas, {} otps, {} send-log rows",
        report.captchas, report.otps, report.send_log
    );
    Ok(report)
}
