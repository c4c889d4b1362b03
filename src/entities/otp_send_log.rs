//! OTP send log entity - Append-only audit of code sends, used for rate limiting.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Send-log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "otp_send_log")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Normalised email a code was sent to
    #[sea_orm(indexed)]
    pub email: String,
    /// When the send was admitted
    pub sent_at: DateTimeUtc,
}

/// Send-log rows are standalone
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
