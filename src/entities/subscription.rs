//! Subscription entity - A user's time-boxed access window to a product.
//!
//! `pending → active | rejected`, `active → expired | cancelled`. Approval fields
//! are written once, by the transition that activates or rejects the row.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// Lifecycle tokens as stored in `subscriptions.status`
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Awaiting staff review
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Approved and within its window
    #[sea_orm(string_value = "active")]
    Active,
    /// Turned down by staff (terminal)
    #[sea_orm(string_value = "rejected")]
    Rejected,
    /// Window elapsed (terminal)
    #[sea_orm(string_value = "expired")]
    Expired,
    /// Ended early (terminal)
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Payment tokens as stored in `subscriptions.payment_status`
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// No settled payment yet
    #[sea_orm(string_value = "pending")]
    Pending,
    /// A linked transaction succeeded
    #[sea_orm(string_value = "paid")]
    Paid,
    /// The latest payment attempt failed
    #[sea_orm(string_value = "failed")]
    Failed,
    /// The settled payment was returned
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

/// Subscription database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    /// Unique identifier for the subscription
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Purchased product
    pub product_id: i64,
    /// Start of the access window
    pub start_date: DateTimeUtc,
    /// End of the access window, strictly after `start_date`
    pub end_date: DateTimeUtc,
    /// Lifecycle state
    pub status: SubscriptionStatus,
    /// Payment state, synced from linked transactions
    pub payment_status: PaymentStatus,
    /// Admin who approved or rejected the request
    pub approved_by: Option<i64>,
    /// When the approval decision was made
    pub approved_at: Option<DateTimeUtc>,
    /// Required when rejected
    pub rejection_reason: Option<String>,
    /// When the request was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Subscription and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each subscription belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Restrict"
    )]
    User,
    /// Each subscription is for one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_delete = "Restrict"
    )]
    Product,
    /// Admin that decided the request
    #[sea_orm(
        belongs_to = "super::admin::Entity",
        from = "Column::ApprovedBy",
        to = "super::admin::Column::Id"
    )]
    Approver,
    /// Payment attempts linked to the subscription
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
