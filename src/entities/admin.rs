//! Admin entity - Staff and superadmin accounts.
//!
//! Staff admins are scoped to a single product through `product_category`,
//! which holds the product name they may act on.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// Role tokens as stored in `admins.role`
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    /// Product-scoped staff member
    #[sea_orm(string_value = "staff")]
    Staff,
    /// Unrestricted administrator
    #[sea_orm(string_value = "superadmin")]
    Superadmin,
}

/// Admin database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "admins")]
pub struct Model {
    /// Unique identifier for the admin
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login name, unique
    #[sea_orm(unique)]
    pub username: String,
    /// Contact email, unique
    #[sea_orm(unique)]
    pub email: String,
    /// Credential hash produced by the login layer
    pub password_hash: String,
    /// `staff` or `superadmin`
    pub role: AdminRole,
    /// Product name a staff admin is scoped to
    pub product_category: Option<String>,
    /// Disabled admins cannot act
    pub is_active: bool,
    /// When the account was created
    pub created_at: DateTimeUtc,
}

/// Admins are only referenced by approval columns on other tables
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
