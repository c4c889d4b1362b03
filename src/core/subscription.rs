//! Subscription lifecycle - requests, staff decisions, cancellation and expiry.
//!
//! `pending → active | rejected`, `active → expired | cancelled`; the last three
//! are terminal. Every transition is a conditional update on the current status,
//! so approval, rejection, cancellation and the expiry sweep can race freely:
//! exactly one wins and the others see `InvalidTransition`.

use crate::{
    core::{
        authz,
        collaborators::CoreContext,
        notification::{self, NotificationEvent},
        payment, product,
    },
    entities::{
        PaymentStatus, Subscription, SubscriptionStatus, Transaction, TransactionStatus, User,
        subscription, transaction,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Retrieves a subscription by id.
///
/// # Errors
/// Returns `Error::NotFound` for an unknown id.
pub async fn get_subscription<C: ConnectionTrait>(
    db: &C,
    subscription_id: i64,
) -> Result<subscription::Model> {
    Subscription::find_by_id(subscription_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("subscription", subscription_id))
}

/// A user's subscriptions, newest first.
pub async fn list_user_subscriptions<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<Vec<subscription::Model>> {
    Subscription::find()
        .filter(subscription::Column::UserId.eq(user_id))
        .order_by_desc(subscription::Column::CreatedAt)
        .order_by_desc(subscription::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Whether `user_id` currently has an active, unexpired subscription to `product_id`.
pub async fn has_active_access<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    user_id: i64,
    product_id: i64,
) -> Result<bool> {
    let count = Subscription::find()
        .filter(subscription::Column::UserId.eq(user_id))
        .filter(subscription::Column::ProductId.eq(product_id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
        .filter(subscription::Column::EndDate.gt(ctx.now()))
        .count(db)
        .await?;
    Ok(count > 0)
}

async fn report_lost_race<C: ConnectionTrait>(
    db: &C,
    subscription_id: i64,
    to: SubscriptionStatus,
) -> Error {
    match get_subscription(db, subscription_id).await {
        Ok(current) => Error::transition(
            "subscription",
            current.status.to_value(),
            &to.to_value(),
        ),
        Err(e) => e,
    }
}

/// Creates a pending subscription for `user_id` to `product_id`.
///
/// The window starts now and lasts the product's `duration_days`.
///
/// # Errors
/// - `Error::NotFound` for an unknown user or product
/// - `Error::Validation` for an inactive user or product
#[instrument(skip(db, ctx))]
pub async fn create_subscription<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    user_id: i64,
    product_id: i64,
) -> Result<subscription::Model> {
    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("user", user_id))?;
    if !user.is_active {
        return Err(Error::validation("User account is disabled"));
    }
    let product = product::get_product_by_id(db, product_id).await?;
    if !product.is_active {
        return Err(Error::validation(format!(
            "Product '{}' is not available",
            product.name
        )));
    }

    let now = ctx.now();
    let row = subscription::ActiveModel {
        user_id: Set(user.id),
        product_id: Set(product.id),
        start_date: Set(now),
        end_date: Set(now + Duration::days(i64::from(product.duration_days))),
        status: Set(SubscriptionStatus::Pending),
        payment_status: Set(PaymentStatus::Pending),
        approved_by: Set(None),
        approved_at: Set(None),
        rejection_reason: Set(None),
        created_at: Set(now),
        ..Default::default()
    };
    let created = row.insert(db).await?;
    info!(
        "Subscription #{} requested by user #{} for '{}'",
        created.id, user.id, product.name
    );

    notification::dispatch(
        db,
        ctx,
        NotificationEvent::SubscriptionRequested {
            subscription: &created,
            user: &user,
            product: &product,
        },
    )
    .await;
    Ok(created)
}

/// Activates a pending subscription.
///
/// The subscription must be paid, or have a pending linked transaction that staff
/// verified by hand; in that case the transaction is flipped to `success` in the
/// same database transaction, after the status update has won.
///
/// # Errors
/// - `Error::NotFound` for an unknown subscription or admin
/// - `Error::Unauthorized` if the admin is out of scope
/// - `Error::InvalidTransition` unless the subscription is pending, including
///   when a concurrent decision got there first
/// - `Error::Validation` if no payment has been received or submitted
#[instrument(skip(db, ctx))]
pub async fn approve_subscription(
    db: &DatabaseConnection,
    ctx: &CoreContext,
    subscription_id: i64,
    admin_id: i64,
) -> Result<subscription::Model> {
    let sub = get_subscription(db, subscription_id).await?;
    let admin = authz::load_admin(db, admin_id).await?;
    let product = product::get_product_by_id(db, sub.product_id).await?;
    authz::authorize_for_product(db, ctx, &admin, &product, "approve subscription").await?;

    if sub.status != SubscriptionStatus::Pending {
        return Err(Error::transition(
            "subscription",
            sub.status.to_value(),
            &SubscriptionStatus::Active.to_value(),
        ));
    }

    let pending_payment = if sub.payment_status == PaymentStatus::Paid {
        None
    } else {
        let pending = Transaction::find()
            .filter(transaction::Column::SubscriptionId.eq(sub.id))
            .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
            .order_by_desc(transaction::Column::CreatedAt)
            .order_by_desc(transaction::Column::Id)
            .one(db)
            .await?
            .ok_or_else(|| {
                Error::validation(format!(
                    "Subscription #{} has no payment to approve",
                    sub.id
                ))
            })?;
        Some(pending)
    };

    let now = ctx.now();
    let txn = db.begin().await?;
    let result = Subscription::update_many()
        .set(subscription::ActiveModel {
            status: Set(SubscriptionStatus::Active),
            approved_by: Set(Some(admin.id)),
            approved_at: Set(Some(now)),
            ..Default::default()
        })
        .filter(subscription::Column::Id.eq(sub.id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Pending))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Err(report_lost_race(db, sub.id, SubscriptionStatus::Active).await);
    }

    if let Some(pending) = pending_payment {
        let flipped = Transaction::update_many()
            .set(transaction::ActiveModel {
                status: Set(TransactionStatus::Success),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(transaction::Column::Id.eq(pending.id))
            .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
            .exec(&txn)
            .await?;
        if flipped.rows_affected == 0 {
            txn.rollback().await?;
            let current = payment::get_transaction_by_reference(db, &pending.payment_reference)
                .await?;
            return Err(Error::transition(
                "transaction",
                current.status.to_value(),
                &TransactionStatus::Success.to_value(),
            ));
        }
        payment::sync_payment_status(&txn, sub.id).await?;
    }
    txn.commit().await?;
    info!("Subscription #{} approved by admin #{}", sub.id, admin.id);

    notification::dispatch(
        db,
        ctx,
        NotificationEvent::SubscriptionApproved {
            subscription_id: sub.id,
            admin_id: admin.id,
        },
    )
    .await;
    get_subscription(db, sub.id).await
}

/// Rejects a pending subscription with a reason.
///
/// # Errors
/// - `Error::Validation` for an empty reason
/// - `Error::NotFound` for an unknown subscription or admin
/// - `Error::Unauthorized` if the admin is out of scope
/// - `Error::InvalidTransition` unless the subscription is pending
#[instrument(skip(db, ctx, reason))]
pub async fn reject_subscription<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    subscription_id: i64,
    admin_id: i64,
    reason: &str,
) -> Result<subscription::Model> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Error::validation("A rejection reason is required"));
    }
    let sub = get_subscription(db, subscription_id).await?;
    let admin = authz::load_admin(db, admin_id).await?;
    let product = product::get_product_by_id(db, sub.product_id).await?;
    authz::authorize_for_product(db, ctx, &admin, &product, "reject subscription").await?;

    let result = Subscription::update_many()
        .set(subscription::ActiveModel {
            status: Set(SubscriptionStatus::Rejected),
            approved_by: Set(Some(admin.id)),
            approved_at: Set(Some(ctx.now())),
            rejection_reason: Set(Some(reason.to_string())),
            ..Default::default()
        })
        .filter(subscription::Column::Id.eq(sub.id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Pending))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(report_lost_race(db, sub.id, SubscriptionStatus::Rejected).await);
    }
    info!("Subscription #{} rejected by admin #{}", sub.id, admin.id);

    notification::dispatch(
        db,
        ctx,
        NotificationEvent::SubscriptionRejected {
            subscription_id: sub.id,
            admin_id: admin.id,
            reason,
        },
    )
    .await;
    get_subscription(db, sub.id).await
}

/// Ends an active subscription early.
///
/// # Errors
/// - `Error::NotFound` for an unknown subscription
/// - `Error::InvalidTransition` unless the subscription is active
pub async fn cancel_subscription<C: ConnectionTrait>(
    db: &C,
    subscription_id: i64,
) -> Result<subscription::Model> {
    let result = Subscription::update_many()
        .set(subscription::ActiveModel {
            status: Set(SubscriptionStatus::Cancelled),
            ..Default::default()
        })
        .filter(subscription::Column::Id.eq(subscription_id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(report_lost_race(db, subscription_id, SubscriptionStatus::Cancelled).await);
    }
    info!("Subscription #{} cancelled", subscription_id);
    get_subscription(db, subscription_id).await
}

/// Expires every active subscription whose window has ended by `now`.
///
/// Returns how many rows changed; a second run with the same `now` changes none.
#[instrument(skip(db))]
pub async fn sweep_expired_subscriptions<C: ConnectionTrait>(
    db: &C,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = Subscription::update_many()
        .set(subscription::ActiveModel {
            status: Set(SubscriptionStatus::Expired),
            ..Default::default()
        })
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
        .filter(subscription::Column::EndDate.lte(now))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        info!("Expired {} subscriptions", result.rows_affected);
    }
    Ok(result.rows_affected)
}

/// Creates an already active, paid subscription on an admin's behalf.
///
/// # Errors
/// - `Error::NotFound` for an unknown user, product or admin
/// - `Error::Unauthorized` if the admin is out of scope
/// - `Error::Validation` for an inactive user or product
#[instrument(skip(db, ctx))]
pub async fn grant_subscription<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    admin_id: i64,
    user_id: i64,
    product_id: i64,
) -> Result<subscription::Model> {
    let admin = authz::load_admin(db, admin_id).await?;
    let product = product::get_product_by_id(db, product_id).await?;
    authz::authorize_for_product(db, ctx, &admin, &product, "grant subscription").await?;
    if !product.is_active {
        return Err(Error::validation(format!(
            "Product '{}' is not available",
            product.name
        )));
    }
    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("user", user_id))?;
    if !user.is_active {
        return Err(Error::validation("User account is disabled"));
    }

    let now = ctx.now();
    let row = subscription::ActiveModel {
        user_id: Set(user.id),
        product_id: Set(product.id),
        start_date: Set(now),
        end_date: Set(now + Duration::days(i64::from(product.duration_days))),
        status: Set(SubscriptionStatus::Active),
        payment_status: Set(PaymentStatus::Paid),
        approved_by: Set(Some(admin.id)),
        approved_at: Set(Some(now)),
        rejection_reason: Set(None),
        created_at: Set(now),
        ..Default::default()
    };
    let created = row.insert(db).await?;
    info!(
        "Admin #{} granted subscription #{} to user #{}",
        admin.id, created.id, user.id
    );

    notification::dispatch(
        db,
        ctx,
        NotificationEvent::SubscriptionGranted {
            subscription: &created,
            user: &user,
            product: &product,
        },
    )
    .await;
    Ok(created)
}
