//! Signal entity - One trading call published under a product.
//!
//! Trading status (`PENDING → ACTIVE → CLOSED`) and approval status
//! (`PENDING → APPROVED | REJECTED`) move independently. Exit fields and the
//! committed `profit_loss` are only written by the close transition.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// Trade direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    /// Long position
    #[sea_orm(string_value = "BUY")]
    Buy,
    /// Short position
    #[sea_orm(string_value = "SELL")]
    Sell,
}

/// Trading lifecycle tokens as stored in `signals.status`
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    /// Published, not yet entered
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Entered, position open
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    /// Exited, P&L committed
    #[sea_orm(string_value = "CLOSED")]
    Closed,
}

/// Review tokens as stored in `signals.approval_status`
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    /// Awaiting review
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Cleared for public display
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    /// Turned down
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

/// Signal database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "signals")]
pub struct Model {
    /// Unique identifier for the signal
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Product the signal is published under
    pub product_id: i64,
    /// Instrument symbol
    pub symbol: String,
    /// Venue label (NSE, COINBASE, ...)
    pub exchange: Option<String>,
    /// BUY or SELL
    pub signal_type: SignalType,
    /// Price at entry; set when the signal becomes ACTIVE
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub entry_price: Option<Decimal>,
    /// When the position was entered
    pub entry_time: Option<DateTimeUtc>,
    /// Price at exit; set only when CLOSED
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub exit_price: Option<Decimal>,
    /// When the position was exited; set only when CLOSED
    pub exit_time: Option<DateTimeUtc>,
    /// Advisory target
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub target_price: Option<Decimal>,
    /// Advisory stop
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub stop_loss: Option<Decimal>,
    /// Externally supplied market price, display only
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub live_price: Option<Decimal>,
    /// Trading lifecycle
    pub status: SignalStatus,
    /// Review state, gates public visibility
    pub approval_status: ApprovalStatus,
    /// Admin who approved or rejected the signal
    pub approved_by: Option<i64>,
    /// When the review decision was made
    pub approved_at: Option<DateTimeUtc>,
    /// Committed P&L, set on close
    #[sea_orm(column_type = "Decimal(Some((10, 2)))", nullable)]
    pub profit_loss: Option<Decimal>,
    /// Whether approved signals are shown outside the subscriber area
    pub is_public: bool,
    /// When the signal was published
    pub created_at: DateTimeUtc,
    /// When the signal was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Signal and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each signal belongs to one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_delete = "Cascade"
    )]
    Product,
    /// Admin that reviewed the signal
    #[sea_orm(
        belongs_to = "super::admin::Entity",
        from = "Column::ApprovedBy",
        to = "super::admin::Column::Id"
    )]
    Approver,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
