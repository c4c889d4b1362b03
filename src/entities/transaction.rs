//! Transaction entity - One payment attempt.
//!
//! `payment_reference` is the idempotency key for settlement callbacks and is
//! unique across the table. Status moves `pending → success | failed` and
//! `success → refunded`.
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// Status tokens as stored in `transactions.status`
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Submitted, not yet settled
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Settled successfully
    #[sea_orm(string_value = "success")]
    Success,
    /// Settlement failed
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Settled then returned
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Paying user
    pub user_id: i64,
    /// Subscription being paid for, if any
    pub subscription_id: Option<i64>,
    /// Amount paid
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub amount: Decimal,
    /// Free-form method label (`manual`, `upi`, ...)
    pub payment_method: Option<String>,
    /// Gateway or user-supplied reference, unique
    #[sea_orm(unique)]
    pub payment_reference: String,
    /// Settlement state
    pub status: TransactionStatus,
    /// When the attempt was recorded
    pub created_at: DateTimeUtc,
    /// When the status last changed
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Restrict"
    )]
    User,
    /// Optional link to the subscription being paid for
    #[sea_orm(
        belongs_to = "super::subscription::Entity",
        from = "Column::SubscriptionId",
        to = "super::subscription::Column::Id"
    )]
    Subscription,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
