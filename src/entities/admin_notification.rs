//! Admin notification entity - In-app staff inbox rows.
//!
//! Rows are created by other components; afterwards only `is_read` changes.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// Notification category tokens as stored in `admin_notifications.type`
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(50))")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Account events
    #[sea_orm(string_value = "user")]
    User,
    /// Subscription and payment events
    #[sea_orm(string_value = "subscription")]
    Subscription,
    /// Signal events
    #[sea_orm(string_value = "signal")]
    Signal,
    /// Audit trail of admin actions
    #[sea_orm(string_value = "system")]
    System,
}

/// Notification database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "admin_notifications")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Category tag
    #[sea_orm(column_name = "type")]
    pub notification_type: NotificationKind,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Id of the triggering entity (user, subscription, signal, admin)
    pub related_id: Option<i64>,
    /// Flips once on acknowledgment
    pub is_read: bool,
    /// When the notification was created
    pub created_at: DateTimeUtc,
}

/// Notifications reference other rows loosely through `related_id`
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
