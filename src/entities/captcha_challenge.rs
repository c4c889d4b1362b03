//! CAPTCHA challenge entity - A single-use human check.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// CAPTCHA database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "captcha_challenge")]
pub struct Model {
    /// Random URL-safe token handed to the client
    #[sea_orm(primary_key, auto_increment = false)]
    pub captcha_id: String,
    /// Puzzle text shown to the client
    pub question: String,
    /// Expected answer; never returned to callers
    pub captcha_answer: String,
    /// Deadline for solving
    pub captcha_expires_at: DateTimeUtc,
    /// Flips false → true exactly once
    pub used: bool,
    /// When the challenge was issued
    pub created_at: DateTimeUtc,
}

/// CAPTCHA rows are standalone
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
