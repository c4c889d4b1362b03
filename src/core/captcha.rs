//! CAPTCHA challenges - Single-use math puzzles gating OTP sends.
//!
//! Issuance stores the id, answer and a short expiry and returns only the id and
//! the question. Verification consumes the challenge with a conditional update on
//! `used`, so two concurrent correct answers cannot both succeed.

use crate::{
    core::collaborators::CoreContext,
    entities::{CaptchaChallenge, captcha_challenge},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{Set, prelude::*};
use tracing::{debug, info, instrument};

/// Operands are drawn from `1..=CAPTCHA_MAX_OPERAND`
const CAPTCHA_MAX_OPERAND: u32 = 15;

/// What the caller may show to the client. The answer stays server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCaptcha {
    /// Id to submit with the answer
    pub captcha_id: String,
    /// Human-readable puzzle, e.g. `"7 + 12"`
    pub question: String,
    /// When the challenge stops being accepted
    pub expires_at: DateTime<Utc>,
}

fn answers_match(expected: &str, submitted: &str) -> bool {
    expected.trim().to_lowercase() == submitted.trim().to_lowercase()
}

/// Creates and stores a new challenge.
#[instrument(skip(db, ctx))]
pub async fn issue_captcha<C: ConnectionTrait>(db: &C, ctx: &CoreContext) -> Result<IssuedCaptcha> {
    let a = ctx.random.below(CAPTCHA_MAX_OPERAND) + 1;
    let b = ctx.random.below(CAPTCHA_MAX_OPERAND) + 1;
    let now = ctx.now();
    let expires_at = now + Duration::minutes(ctx.settings.captcha_expiry_minutes);

    let challenge = captcha_challenge::ActiveModel {
        captcha_id: Set(ctx.random.token()),
        question: Set(format!("{a} + {b}")),
        captcha_answer: Set((a + b).to_string()),
        captcha_expires_at: Set(expires_at),
        used: Set(false),
        created_at: Set(now),
    };
    let stored = challenge.insert(db).await?;
    debug!("Issued CAPTCHA expiring at {}", expires_at);

    Ok(IssuedCaptcha {
        captcha_id: stored.captcha_id,
        question: stored.question,
        expires_at,
    })
}

/// Checks an answer and consumes the challenge on success.
///
/// A wrong answer leaves the challenge usable until it expires.
///
/// # Errors
/// - `Error::Validation` if the id or answer is blank
/// - `Error::NotFound` for an unknown id
/// - `Error::Expired` past the deadline
/// - `Error::AlreadyUsed` if the challenge was consumed, including by a concurrent call
/// - `Error::Mismatch` for a wrong answer
#[instrument(skip(db, ctx, answer))]
pub async fn verify_captcha<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    captcha_id: &str,
    answer: &str,
) -> Result<()> {
    let captcha_id = captcha_id.trim();
    if captcha_id.is_empty() || answer.trim().is_empty() {
        return Err(Error::validation("CAPTCHA id and answer are required"));
    }

    let challenge = CaptchaChallenge::find_by_id(captcha_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("captcha", captcha_id))?;

    let now = ctx.now();
    if now >= challenge.captcha_expires_at {
        return Err(Error::Expired { what: "CAPTCHA" });
    }
    if challenge.used {
        return Err(Error::AlreadyUsed {
            captcha_id: captcha_id.to_string(),
        });
    }
    if !answers_match(&challenge.captcha_answer, answer) {
        return Err(Error::Mismatch { what: "CAPTCHA answer" });
    }

    let result = CaptchaChallenge::update_many()
        .set(captcha_challenge::ActiveModel {
            used: Set(true),
            ..Default::default()
        })
        .filter(captcha_challenge::Column::CaptchaId.eq(captcha_id))
        .filter(captcha_challenge::Column::Used.eq(false))
        .filter(captcha_challenge::Column::CaptchaExpiresAt.gt(now))
        .exec(db)
        .await?;

    if result.rows_affected == 1 {
        info!("CAPTCHA challenge consumed");
        return Ok(());
    }

    // Lost the race: report what the winner left behind
    let current = CaptchaChallenge::find_by_id(captcha_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("captcha", captcha_id))?;
    if current.used {
        Err(Error::AlreadyUsed {
            captcha_id: captcha_id.to_string(),
        })
    } else {
        Err(Error::Expired { what: "CAPTCHA" })
    }
}
