//! OTP issuance and verification for email signup.
//!
//! One live code per email: issuance upserts the `email_verification_otps` row,
//! storing only a salted hash, and resets the attempt counter. Verification
//! increments the counter atomically before comparing, so the cap holds even
//! under concurrent guesses. A verification counts for registration only while it
//! is fresh (`verification_freshness_minutes`), and no new code can be issued for
//! the email during that window. Verified rows are kept until the next issuance
//! overwrites them.

use crate::{
    core::{captcha, collaborators::CoreContext, rate_limit},
    entities::{EmailVerificationOtp, User, email_verification_otp, user},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    Set, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use tracing::{debug, info, instrument, warn};

/// Digits in an issued code
pub const OTP_LENGTH: usize = 6;

/// Result of a successful issuance. The code itself only goes to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpIssued {
    /// Normalised email the code was sent to
    pub email: String,
    /// When the code stops being accepted
    pub expires_at: DateTime<Utc>,
}

/// Trims and lower-cases an email and checks its basic shape.
///
/// # Errors
/// Returns `Error::Validation` unless there is exactly one `@` with non-empty
/// parts on both sides and no whitespace.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(Error::validation("A valid email address is required"))
    }
}

fn is_fresh(row: &email_verification_otp::Model, ctx: &CoreContext, now: DateTime<Utc>) -> bool {
    row.email_verified
        && row.verified_at.is_some_and(|at| {
            now < at + Duration::minutes(ctx.settings.verification_freshness_minutes)
        })
}

fn validate_code(code: &str) -> Result<&str> {
    let code = code.trim();
    if code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(Error::validation(format!(
            "Verification code must be {OTP_LENGTH} digits"
        )))
    }
}

/// Issues a fresh code for `email` and hands it to the delivery sink.
///
/// The stored row is committed before delivery is attempted; a delivery problem
/// never undoes the issuance.
///
/// # Errors
/// - `Error::Validation` for a malformed email
/// - `Error::AlreadyVerified` while a recent verification is still usable
/// - `Error::Cooldown` if the previous code was sent too recently
/// - `Error::RateLimited` if the send window is full
#[instrument(skip(db, ctx))]
pub async fn request_otp<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    email: &str,
) -> Result<OtpIssued> {
    let email = normalize_email(email)?;
    let now = ctx.now();

    if let Some(existing) = EmailVerificationOtp::find_by_id(email.clone()).one(db).await? {
        if is_fresh(&existing, ctx, now) {
            debug!("Resend for {} refused, verification still fresh", email);
            return Err(Error::AlreadyVerified { email });
        }
        let ready_at =
            existing.otp_sent_at + Duration::seconds(ctx.settings.otp_resend_cooldown_seconds);
        if now < ready_at {
            let retry_after_seconds = (ready_at - now).num_seconds().max(1);
            debug!("Resend for {} refused, {}s remaining", email, retry_after_seconds);
            return Err(Error::Cooldown {
                retry_after_seconds,
            });
        }
    }

    rate_limit::admit_otp_send(db, ctx, &email).await?;

    let code = ctx.random.numeric_code(OTP_LENGTH);
    let expires_at = now + Duration::minutes(ctx.settings.otp_expiry_minutes);
    let row = email_verification_otp::ActiveModel {
        email: Set(email.clone()),
        otp_hash: Set(ctx.hasher.hash(&code)),
        otp_expires_at: Set(expires_at),
        otp_attempts: Set(0),
        email_verified: Set(false),
        verified_at: Set(None),
        otp_sent_at: Set(now),
        created_at: Set(now),
    };
    EmailVerificationOtp::insert(row)
        .on_conflict(
            OnConflict::column(email_verification_otp::Column::Email)
                .update_columns([
                    email_verification_otp::Column::OtpHash,
                    email_verification_otp::Column::OtpExpiresAt,
                    email_verification_otp::Column::OtpAttempts,
                    email_verification_otp::Column::EmailVerified,
                    email_verification_otp::Column::VerifiedAt,
                    email_verification_otp::Column::OtpSentAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    info!("OTP issued for {}, expires at {}", email, expires_at);

    ctx.sink.deliver(
        &email,
        &format!(
            "Your verification code is {code}. It expires in {} minutes.",
            ctx.settings.otp_expiry_minutes
        ),
    );

    Ok(OtpIssued { email, expires_at })
}

/// Verifies a CAPTCHA answer, then issues a code.
///
/// The email is validated first so a malformed request does not burn the challenge.
///
/// # Errors
/// Any error of [`captcha::verify_captcha`] or [`request_otp`].
#[instrument(skip(db, ctx, answer))]
pub async fn request_otp_with_captcha<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    email: &str,
    captcha_id: &str,
    answer: &str,
) -> Result<OtpIssued> {
    let email = normalize_email(email)?;
    captcha::verify_captcha(db, ctx, captcha_id, answer).await?;
    request_otp(db, ctx, &email).await
}

async fn find_otp<C: ConnectionTrait>(db: &C, email: &str) -> Result<email_verification_otp::Model> {
    EmailVerificationOtp::find_by_id(email.to_string())
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("verification code", email))
}

/// Checks `code` for `email`, marking the email (and any user with it) verified.
///
/// Every well-formed call consumes an attempt, including the successful one.
///
/// # Errors
/// - `Error::Validation` for a malformed email or code (no attempt consumed)
/// - `Error::NotFound` if no code was issued
/// - `Error::AlreadyVerified` if the current code was already used
/// - `Error::Exhausted` once attempts exceed the cap, regardless of the code
/// - `Error::Expired` past the deadline
/// - `Error::Mismatch` for a wrong code
#[instrument(skip(db, ctx, code))]
pub async fn verify_otp(
    db: &DatabaseConnection,
    ctx: &CoreContext,
    email: &str,
    code: &str,
) -> Result<()> {
    let email = normalize_email(email)?;
    let code = validate_code(code)?;

    let row = find_otp(db, &email).await?;
    if row.email_verified {
        return Err(Error::AlreadyVerified { email });
    }

    let counted = EmailVerificationOtp::update_many()
        .col_expr(
            email_verification_otp::Column::OtpAttempts,
            Expr::col(email_verification_otp::Column::OtpAttempts).add(1),
        )
        .filter(email_verification_otp::Column::Email.eq(email.as_str()))
        .filter(email_verification_otp::Column::EmailVerified.eq(false))
        .exec(db)
        .await?;
    if counted.rows_affected == 0 {
        return Err(Error::AlreadyVerified { email });
    }

    let row = find_otp(db, &email).await?;
    if row.otp_attempts > ctx.settings.otp_max_attempts {
        warn!("OTP attempts exhausted for {}", email);
        return Err(Error::Exhausted { email });
    }
    let now = ctx.now();
    if now >= row.otp_expires_at {
        return Err(Error::Expired { what: "Verification code" });
    }
    if !ctx.hasher.verify(code, &row.otp_hash) {
        debug!("OTP mismatch for {} (attempt {})", email, row.otp_attempts);
        return Err(Error::Mismatch {
            what: "Verification code",
        });
    }

    let txn = db.begin().await?;
    let marked = EmailVerificationOtp::update_many()
        .set(email_verification_otp::ActiveModel {
            email_verified: Set(true),
            verified_at: Set(Some(now)),
            ..Default::default()
        })
        .filter(email_verification_otp::Column::Email.eq(email.as_str()))
        .filter(email_verification_otp::Column::EmailVerified.eq(false))
        .filter(email_verification_otp::Column::OtpHash.eq(row.otp_hash.as_str()))
        .exec(&txn)
        .await?;

    if marked.rows_affected == 0 {
        txn.rollback().await?;
        let current = find_otp(db, &email).await?;
        return if current.email_verified && current.otp_hash == row.otp_hash {
            Err(Error::AlreadyVerified { email })
        } else {
            // A fresh code replaced the one just checked
            Err(Error::Mismatch {
                what: "Verification code",
            })
        };
    }

    User::update_many()
        .set(user::ActiveModel {
            email_verified: Set(true),
            ..Default::default()
        })
        .filter(user::Column::Email.eq(email.as_str()))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    info!("Email {} verified", email);
    Ok(())
}

/// Whether `email` was verified within the freshness window.
pub async fn is_email_verified<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    email: &str,
) -> Result<bool> {
    let email = normalize_email(email)?;
    let now = ctx.now();
    Ok(EmailVerificationOtp::find_by_id(email)
        .one(db)
        .await?
        .is_some_and(|row| is_fresh(&row, ctx, now)))
}
