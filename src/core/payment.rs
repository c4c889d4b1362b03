//! Payment attempts - transactions keyed by their gateway reference.
//!
//! `payment_reference` is the idempotency key: recording it twice fails with
//! `DuplicatePayment` and leaves the first row alone. Status moves
//! `pending → success | failed` and `success → refunded` through conditional
//! updates, and every settlement re-derives the linked subscription's
//! `payment_status` in the same database transaction.

use crate::{
    core::{
        collaborators::CoreContext,
        notification::{self, NotificationEvent},
        product,
    },
    entities::{
        PaymentStatus, Subscription, SubscriptionStatus, Transaction, TransactionStatus,
        max_money, subscription, transaction,
    },
    errors::{Error, Result, is_unique_violation},
};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument, warn};

/// A payment attempt to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    /// Paying user
    pub user_id: i64,
    /// Subscription being paid for, if any
    pub subscription_id: Option<i64>,
    /// Amount, never negative
    pub amount: Decimal,
    /// Free-form method label, e.g. `upi`
    pub payment_method: Option<String>,
    /// Gateway reference, globally unique
    pub payment_reference: String,
    /// Initial status
    pub status: TransactionStatus,
}

/// Outcome reported by the gateway's settlement callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Funds received
    Success,
    /// Payment declined or abandoned
    Failed,
    /// Received funds returned
    Refunded,
}

impl Settlement {
    const fn target(self) -> TransactionStatus {
        match self {
            Self::Success => TransactionStatus::Success,
            Self::Failed => TransactionStatus::Failed,
            Self::Refunded => TransactionStatus::Refunded,
        }
    }

    /// Status a transaction must be in for this outcome to apply
    const fn required(self) -> TransactionStatus {
        match self {
            Self::Success | Self::Failed => TransactionStatus::Pending,
            Self::Refunded => TransactionStatus::Success,
        }
    }
}

/// Subscription payment state implied by a transaction status
#[must_use]
pub const fn payment_status_for(status: TransactionStatus) -> PaymentStatus {
    match status {
        TransactionStatus::Pending => PaymentStatus::Pending,
        TransactionStatus::Success => PaymentStatus::Paid,
        TransactionStatus::Failed => PaymentStatus::Failed,
        TransactionStatus::Refunded => PaymentStatus::Refunded,
    }
}

/// Re-derives `payment_status` from the subscription's transactions.
///
/// Any successful transaction means paid; otherwise the latest attempt decides.
pub(crate) async fn sync_payment_status<C: ConnectionTrait>(
    db: &C,
    subscription_id: i64,
) -> Result<PaymentStatus> {
    let paid = Transaction::find()
        .filter(transaction::Column::SubscriptionId.eq(subscription_id))
        .filter(transaction::Column::Status.eq(TransactionStatus::Success))
        .count(db)
        .await?
        > 0;

    let status = if paid {
        PaymentStatus::Paid
    } else {
        Transaction::find()
            .filter(transaction::Column::SubscriptionId.eq(subscription_id))
            .order_by_desc(transaction::Column::CreatedAt)
            .order_by_desc(transaction::Column::Id)
            .one(db)
            .await?
            .map_or(PaymentStatus::Pending, |latest| {
                payment_status_for(latest.status)
            })
    };

    Subscription::update_many()
        .set(subscription::ActiveModel {
            payment_status: Set(status),
            ..Default::default()
        })
        .filter(subscription::Column::Id.eq(subscription_id))
        .exec(db)
        .await?;
    Ok(status)
}

/// Finds a transaction by its gateway reference.
///
/// # Errors
/// Returns `Error::NotFound` for an unknown reference.
pub async fn get_transaction_by_reference<C: ConnectionTrait>(
    db: &C,
    reference: &str,
) -> Result<transaction::Model> {
    Transaction::find()
        .filter(transaction::Column::PaymentReference.eq(reference.trim()))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("transaction", reference.trim()))
}

/// Records a payment attempt.
///
/// # Errors
/// - `Error::Validation` for a blank reference or an amount out of range
/// - `Error::DuplicatePayment` if the reference was already recorded
#[instrument(skip(db, ctx, new), fields(reference = %new.payment_reference))]
pub async fn record_transaction(
    db: &DatabaseConnection,
    ctx: &CoreContext,
    new: NewTransaction,
) -> Result<transaction::Model> {
    let reference = new.payment_reference.trim().to_string();
    if reference.is_empty() {
        return Err(Error::validation("Payment reference is required"));
    }
    if new.amount < Decimal::ZERO {
        return Err(Error::validation("Amount cannot be negative"));
    }
    if new.amount.round_dp(2) > max_money() {
        return Err(Error::validation(format!("Amount cannot exceed {}", max_money())));
    }

    let now = ctx.now();
    let row = transaction::ActiveModel {
        user_id: Set(new.user_id),
        subscription_id: Set(new.subscription_id),
        amount: Set(new.amount.round_dp(2)),
        payment_method: Set(new.payment_method),
        payment_reference: Set(reference.clone()),
        status: Set(new.status),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    let txn = db.begin().await?;
    let created = match row.insert(&txn).await {
        Ok(created) => created,
        Err(e) if is_unique_violation(&e) => {
            warn!("Duplicate payment reference {}", reference);
            return Err(Error::DuplicatePayment { reference });
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(subscription_id) = created.subscription_id {
        sync_payment_status(&txn, subscription_id).await?;
    }
    txn.commit().await?;

    info!(
        "Recorded {} transaction #{} for user #{}",
        created.status.to_value(),
        created.id,
        created.user_id
    );
    Ok(created)
}

/// Records a pending payment against a pending subscription and alerts staff.
///
/// # Errors
/// - `Error::NotFound` for an unknown subscription
/// - `Error::InvalidTransition` unless the subscription is pending
/// - any error of [`record_transaction`]
pub async fn submit_payment(
    db: &DatabaseConnection,
    ctx: &CoreContext,
    subscription_id: i64,
    reference: &str,
    amount: Decimal,
    payment_method: Option<String>,
) -> Result<transaction::Model> {
    let sub = Subscription::find_by_id(subscription_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("subscription", subscription_id))?;
    if sub.status != SubscriptionStatus::Pending {
        return Err(Error::transition(
            "subscription",
            sub.status.to_value(),
            "pending payment",
        ));
    }
    let product = product::get_product_by_id(db, sub.product_id).await?;

    let created = record_transaction(
        db,
        ctx,
        NewTransaction {
            user_id: sub.user_id,
            subscription_id: Some(sub.id),
            amount,
            payment_method,
            payment_reference: reference.to_string(),
            status: TransactionStatus::Pending,
        },
    )
    .await?;

    notification::dispatch(
        db,
        ctx,
        NotificationEvent::PaymentSubmitted {
            transaction: &created,
            product: &product,
        },
    )
    .await;
    Ok(created)
}

/// Applies a gateway settlement to the transaction with `reference`.
///
/// # Errors
/// - `Error::NotFound` for an unknown reference
/// - `Error::InvalidTransition` if the transaction is not in the required state,
///   including when a concurrent settlement got there first
#[instrument(skip(db, ctx))]
pub async fn settle_transaction(
    db: &DatabaseConnection,
    ctx: &CoreContext,
    reference: &str,
    outcome: Settlement,
) -> Result<transaction::Model> {
    let existing = get_transaction_by_reference(db, reference).await?;
    let target = outcome.target();
    if existing.status != outcome.required() {
        return Err(Error::transition(
            "transaction",
            existing.status.to_value(),
            &target.to_value(),
        ));
    }

    let txn = db.begin().await?;
    let result = Transaction::update_many()
        .set(transaction::ActiveModel {
            status: Set(target),
            updated_at: Set(ctx.now()),
            ..Default::default()
        })
        .filter(transaction::Column::Id.eq(existing.id))
        .filter(transaction::Column::Status.eq(outcome.required()))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        let current = get_transaction_by_reference(db, reference).await?;
        return Err(Error::transition(
            "transaction",
            current.status.to_value(),
            &target.to_value(),
        ));
    }
    if let Some(subscription_id) = existing.subscription_id {
        let payment = sync_payment_status(&txn, subscription_id).await?;
        info!(
            "Subscription #{} payment status now {}",
            subscription_id,
            payment.to_value()
        );
    }
    txn.commit().await?;

    info!(
        "Transaction {} settled as {}",
        existing.payment_reference,
        target.to_value()
    );
    get_transaction_by_reference(db, reference).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::subscription::{create_subscription, get_subscription};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    fn new_tx(user_id: i64, reference: &str, amount: Decimal) -> NewTransaction {
        NewTransaction {
            user_id,
            subscription_id: None,
            amount,
            payment_method: Some("upi".to_string()),
            payment_reference: reference.to_string(),
            status: TransactionStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_duplicate_reference_leaves_original_untouched() -> Result<()> {
        let env = setup_env().await?;
        let user = create_test_user(&env, "alice@example.com", "9000000001").await?;

        let first = record_transaction(&env.db, &env.ctx, new_tx(user.id, "PAY-1", dec!(499.00)))
            .await?;
        let mut dup = new_tx(user.id, "PAY-1", dec!(1.00));
        dup.status = TransactionStatus::Success;
        let result = record_transaction(&env.db, &env.ctx, dup).await;
        assert!(matches!(result, Err(Error::DuplicatePayment { .. })));

        let stored = get_transaction_by_reference(&env.db, "PAY-1").await?;
        assert_eq!(stored, first);
        assert_eq!(Transaction::find().count(&env.db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_validation() -> Result<()> {
        let env = setup_env().await?;
        let user = create_test_user(&env, "alice@example.com", "9000000001").await?;

        let blank = record_transaction(&env.db, &env.ctx, new_tx(user.id, "  ", dec!(1))).await;
        assert!(matches!(blank, Err(Error::Validation { .. })));
        let negative =
            record_transaction(&env.db, &env.ctx, new_tx(user.id, "PAY-2", dec!(-1))).await;
        assert!(matches!(negative, Err(Error::Validation { .. })));
        let oversized =
            record_transaction(&env.db, &env.ctx, new_tx(user.id, "PAY-3", dec!(100000000.00)))
                .await;
        assert!(matches!(oversized, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_settlement_transitions_and_sync() -> Result<()> {
        let env = setup_env().await?;
        let user = create_test_user(&env, "alice@example.com", "9000000001").await?;
        let product = create_test_product(&env, "Gold", dec!(999.00), 30).await?;
        let sub = create_subscription(&env.db, &env.ctx, user.id, product.id).await?;

        submit_payment(&env.db, &env.ctx, sub.id, "PAY-9", dec!(999.00), None).await?;
        assert_eq!(
            get_subscription(&env.db, sub.id).await?.payment_status,
            PaymentStatus::Pending
        );

        let refund_first = settle_transaction(&env.db, &env.ctx, "PAY-9", Settlement::Refunded).await;
        assert!(matches!(refund_first, Err(Error::InvalidTransition { .. })));

        let settled = settle_transaction(&env.db, &env.ctx, "PAY-9", Settlement::Success).await?;
        assert_eq!(settled.status, TransactionStatus::Success);
        assert_eq!(
            get_subscription(&env.db, sub.id).await?.payment_status,
            PaymentStatus::Paid
        );

        let twice = settle_transaction(&env.db, &env.ctx, "PAY-9", Settlement::Failed).await;
        assert!(matches!(twice, Err(Error::InvalidTransition { .. })));

        settle_transaction(&env.db, &env.ctx, "PAY-9", Settlement::Refunded).await?;
        assert_eq!(
            get_subscription(&env.db, sub.id).await?.payment_status,
            PaymentStatus::Refunded
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_attempt_then_success_is_paid() -> Result<()> {
        let env = setup_env().await?;
        let user = create_test_user(&env, "alice@example.com", "9000000001").await?;
        let product = create_test_product(&env, "Gold", dec!(999.00), 30).await?;
        let sub = create_subscription(&env.db, &env.ctx, user.id, product.id).await?;

        submit_payment(&env.db, &env.ctx, sub.id, "PAY-A", dec!(999.00), None).await?;
        settle_transaction(&env.db, &env.ctx, "PAY-A", Settlement::Failed).await?;
        assert_eq!(
            get_subscription(&env.db, sub.id).await?.payment_status,
            PaymentStatus::Failed
        );

        submit_payment(&env.db, &env.ctx, sub.id, "PAY-B", dec!(999.00), None).await?;
        settle_transaction(&env.db, &env.ctx, "PAY-B", Settlement::Success).await?;
        assert_eq!(
            get_subscription(&env.db, sub.id).await?.payment_status,
            PaymentStatus::Paid
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_reference() -> Result<()> {
        let env = setup_env().await?;
        let result = settle_transaction(&env.db, &env.ctx, "nope", Settlement::Success).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_settlements_have_one_winner() -> Result<()> {
        let env = setup_env().await?;
        let user = create_test_user(&env, "alice@example.com", "9000000001").await?;
        record_transaction(&env.db, &env.ctx, new_tx(user.id, "PAY-R", dec!(10.00))).await?;

        let (a, b) = tokio::join!(
            settle_transaction(&env.db, &env.ctx, "PAY-R", Settlement::Success),
            settle_transaction(&env.db, &env.ctx, "PAY-R", Settlement::Failed),
        );
        assert!(a.is_ok() != b.is_ok());
        Ok(())
    }
}
