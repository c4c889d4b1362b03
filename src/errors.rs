//! Unified error type for the signal desk core.
//!
//! Every public operation returns [`Result`]. Variants mirror the failure modes
//! callers are expected to branch on (expired credentials, lost races, scope
//! violations); storage failures are carried through as [`Error::Database`].

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// All errors surfaced by the core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before storage is touched
    #[error("Validation error: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// Unknown id, email or reference
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of record that was looked up
        entity: &'static str,
        /// The key that did not resolve
        key: String,
    },

    /// OTP or CAPTCHA past its deadline
    #[error("{what} has expired")]
    Expired {
        /// Which credential expired
        what: &'static str,
    },

    /// CAPTCHA challenge already consumed
    #[error("CAPTCHA challenge {captcha_id} was already used")]
    AlreadyUsed {
        /// The challenge id
        captcha_id: String,
    },

    /// Signal exit fields already set
    #[error("Signal {signal_id} is already closed")]
    AlreadyClosed {
        /// The signal id
        signal_id: i64,
    },

    /// OTP already used to verify this email
    #[error("Email {email} is already verified")]
    AlreadyVerified {
        /// The verified email
        email: String,
    },

    /// OTP attempt cap reached; a fresh code must be issued
    #[error("Too many attempts for {email}; request a new code")]
    Exhausted {
        /// The email whose code is locked
        email: String,
    },

    /// Send-log threshold reached within the trailing window
    #[error("Too many verification codes requested for {email}")]
    RateLimited {
        /// The throttled email
        email: String,
    },

    /// A fresh code was requested too soon after the previous one
    #[error("Please wait {retry_after_seconds}s before requesting another code")]
    Cooldown {
        /// Seconds until a resend is allowed
        retry_after_seconds: i64,
    },

    /// Submitted CAPTCHA answer or OTP code does not match
    #[error("{what} does not match")]
    Mismatch {
        /// Which credential was wrong
        what: &'static str,
    },

    /// State-machine violation
    #[error("Invalid {entity} transition from '{from}' to '{to}'")]
    InvalidTransition {
        /// Kind of record
        entity: &'static str,
        /// State observed in storage
        from: String,
        /// State that was requested
        to: String,
    },

    /// Payment reference already recorded
    #[error("Duplicate payment reference: {reference}")]
    DuplicatePayment {
        /// The colliding reference
        reference: String,
    },

    /// Unique user field already taken
    #[error("A user with this {field} already exists")]
    Duplicate {
        /// Name of the unique column
        field: &'static str,
    },

    /// Admin lacks the role or product scope for the action
    #[error("Admin {admin_id} is not allowed to {action}")]
    Unauthorized {
        /// Acting admin
        admin_id: i64,
        /// Attempted action
        action: String,
    },

    /// Account creation attempted before the email passed OTP verification
    #[error("Email {email} has not been verified")]
    EmailNotVerified {
        /// The unverified email
        email: String,
    },

    /// Product price/duration are frozen once subscribed to
    #[error("Product {product_id} is referenced by subscriptions and cannot change terms")]
    ProductInUse {
        /// The locked product
        product_id: i64,
    },

    /// User still has pending or active subscriptions
    #[error("User {user_id} still has open subscriptions")]
    OpenSubscriptions {
        /// The user that cannot be purged
        user_id: i64,
    },

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Details
        message: String,
    },

    /// Storage failure
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn transition(entity: &'static str, from: impl Into<String>, to: &str) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.into(),
            to: to.to_string(),
        }
    }
}

/// Returns true when the store rejected a write because of a unique index.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
