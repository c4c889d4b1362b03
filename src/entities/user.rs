//! User entity - A registered customer.
//!
//! Mobile and email are unique. `email_verified` is only ever set through the
//! OTP pipeline; accounts are created after the email has been verified.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub full_name: String,
    /// Mobile number, unique across users
    #[sea_orm(unique)]
    pub mobile: String,
    /// Normalised (trimmed, lower-case) email, unique across users
    #[sea_orm(unique)]
    pub email: String,
    /// Credential hash produced by the login layer
    pub password_hash: String,
    /// Whether the email passed OTP verification
    pub email_verified: bool,
    /// Soft-disable flag
    pub is_active: bool,
    /// When the account was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One user has many subscriptions
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscriptions,
    /// One user has many payment attempts
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
