//! Product business logic - Plans users subscribe to.
//!
//! Price and duration are frozen once any subscription references the product;
//! the freeze is enforced in the same statement that writes the new terms.

use crate::{
    entities::{Product, Subscription, max_money, product, subscription},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    QueryOrder, Set,
    prelude::*,
    sea_query::{Expr, Query},
};
use tracing::info;

fn validate_terms(price: Decimal, duration_days: i32) -> Result<Decimal> {
    if price < Decimal::ZERO {
        return Err(Error::validation("Price cannot be negative"));
    }
    if duration_days <= 0 {
        return Err(Error::validation("Duration must be at least one day"));
    }
    let price = price.round_dp(2);
    if price > max_money() {
        return Err(Error::validation(format!("Price cannot exceed {}", max_money())));
    }
    Ok(price)
}

/// Retrieves all active products, ordered by name.
pub async fn get_active_products<C: ConnectionTrait>(db: &C) -> Result<Vec<product::Model>> {
    Product::find()
        .filter(product::Column::IsActive.eq(true))
        .order_by_asc(product::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a product by id.
///
/// # Errors
/// Returns `Error::NotFound` for an unknown id.
pub async fn get_product_by_id<C: ConnectionTrait>(db: &C, product_id: i64) -> Result<product::Model> {
    Product::find_by_id(product_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("product", product_id))
}

/// Creates an active product.
///
/// # Errors
/// Returns `Error::Validation` for an empty name, a price out of range or a
/// non-positive duration.
pub async fn create_product<C: ConnectionTrait>(
    db: &C,
    name: &str,
    description: Option<String>,
    price: Decimal,
    duration_days: i32,
    now: DateTime<Utc>,
) -> Result<product::Model> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("Product name cannot be empty"));
    }
    let price = validate_terms(price, duration_days)?;

    let row = product::ActiveModel {
        name: Set(name.to_string()),
        description: Set(description),
        price: Set(price),
        duration_days: Set(duration_days),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let created = row.insert(db).await?;
    info!("Created product '{}' (#{})", created.name, created.id);
    Ok(created)
}

/// Changes price and duration while no subscription references the product.
///
/// # Errors
/// - `Error::Validation` for invalid terms
/// - `Error::NotFound` for an unknown product
/// - `Error::ProductInUse` once any subscription exists for it
pub async fn update_product_terms<C: ConnectionTrait>(
    db: &C,
    product_id: i64,
    price: Decimal,
    duration_days: i32,
    now: DateTime<Utc>,
) -> Result<product::Model> {
    let price = validate_terms(price, duration_days)?;

    let unreferenced = Expr::exists(
        Query::select()
            .expr(Expr::val(1))
            .from(Subscription)
            .and_where(subscription::Column::ProductId.eq(product_id))
            .to_owned(),
    )
    .not();

    let result = Product::update_many()
        .set(product::ActiveModel {
            price: Set(price),
            duration_days: Set(duration_days),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(product::Column::Id.eq(product_id))
        .filter(unreferenced)
        .exec(db)
        .await?;

    let current = get_product_by_id(db, product_id).await?;
    if result.rows_affected == 0 {
        return Err(Error::ProductInUse { product_id });
    }
    info!("Updated terms of product #{}", product_id);
    Ok(current)
}

/// Enables or disables purchases of a product.
pub async fn set_product_active<C: ConnectionTrait>(
    db: &C,
    product_id: i64,
    is_active: bool,
    now: DateTime<Utc>,
) -> Result<product::Model> {
    let result = Product::update_many()
        .set(product::ActiveModel {
            is_active: Set(is_active),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(product::Column::Id.eq(product_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found("product", product_id));
    }
    get_product_by_id(db, product_id).await
}
