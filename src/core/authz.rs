//! Admin authorization - role and product scope checks.
//!
//! The stored `role`/`product_category` pair is turned into a [`Capability`]
//! and every staff action goes through [`authorize_for_product`].

use crate::{
    core::{
        collaborators::CoreContext,
        notification::{self, NotificationEvent},
    },
    entities::{Admin, AdminModel, AdminRole, ProductModel},
    errors::{Error, Result},
};
use sea_orm::prelude::*;
use tracing::warn;

/// What an admin may act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Staff scoped to one product name; `None` means no scope was assigned
    Staff(Option<String>),
    /// Unrestricted
    Superadmin,
}

impl Capability {
    /// Capability of an admin account
    #[must_use]
    pub fn of(admin: &AdminModel) -> Self {
        match admin.role {
            AdminRole::Superadmin => Self::Superadmin,
            AdminRole::Staff => Self::Staff(admin.product_category.clone()),
        }
    }

    /// Whether the capability covers `product`.
    #[must_use]
    pub fn covers(&self, product: &ProductModel) -> bool {
        match self {
            Self::Superadmin => true,
            Self::Staff(Some(category)) => category.trim() == product.name.trim(),
            Self::Staff(None) => false,
        }
    }
}

/// Loads an active admin.
///
/// # Errors
/// `Error::NotFound` for an unknown id, `Error::Unauthorized` for a disabled account.
pub async fn load_admin<C: ConnectionTrait>(db: &C, admin_id: i64) -> Result<AdminModel> {
    let admin = Admin::find_by_id(admin_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("admin", admin_id))?;
    if !admin.is_active {
        return Err(Error::Unauthorized {
            admin_id,
            action: "act while disabled".to_string(),
        });
    }
    Ok(admin)
}

/// Checks that `admin` may perform `action` on `product`.
///
/// A refusal is recorded as an "unauthorized access" notification.
///
/// # Errors
/// Returns `Error::Unauthorized` when the admin is disabled or out of scope.
pub async fn authorize_for_product<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    admin: &AdminModel,
    product: &ProductModel,
    action: &str,
) -> Result<()> {
    if admin.is_active && Capability::of(admin).covers(product) {
        return Ok(());
    }

    warn!(
        "Admin #{} denied '{}' on product '{}'",
        admin.id, action, product.name
    );
    let attempted = format!("{action} on product '{}'", product.name);
    notification::dispatch(
        db,
        ctx,
        NotificationEvent::UnauthorizedAccess {
            admin_id: admin.id,
            action: &attempted,
        },
    )
    .await;
    Err(Error::Unauthorized {
        admin_id: admin.id,
        action: attempted,
    })
}
