//! Email verification OTP entity - One live code per email.
//!
//! Keyed by email; a new issuance overwrites the row instead of appending.
//! Only a salted hash of the code is stored.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// OTP database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_verification_otp")]
pub struct Model {
    /// Normalised email the code was sent to
    #[sea_orm(primary_key, auto_increment = false)]
    pub email: String,
    /// `salt$digest` of the code
    pub otp_hash: String,
    /// Deadline for verification
    pub otp_expires_at: DateTimeUtc,
    /// Verification attempts against this code, incremented before comparing
    pub otp_attempts: i32,
    /// Set once the code has been used successfully
    pub email_verified: bool,
    /// When the code was used; registration only honours recent verifications
    pub verified_at: Option<DateTimeUtc>,
    /// When the code was issued, for the resend cooldown
    pub otp_sent_at: DateTimeUtc,
    /// When the row was first created
    pub created_at: DateTimeUtc,
}

/// OTP rows are standalone
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
