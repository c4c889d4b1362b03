//! Notification dispatcher - Staff inbox rows for signups, approvals and signals.
//!
//! Dispatch is stateless fan-out: an event becomes one `admin_notifications` row.
//! [`dispatch`] is called after the triggering write has been committed and never
//! propagates a failure back into it; a lost notification is logged and dropped.
//! Once written, the only mutable field is `is_read`.

use crate::{
    core::collaborators::CoreContext,
    entities::{
        AdminNotification, NotificationKind, ProductModel, SignalModel, SubscriptionModel,
        TransactionModel, UserModel, admin_notification,
    },
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use tracing::{debug, error};

/// Events that raise a staff notification.
#[derive(Debug, Clone, Copy)]
pub enum NotificationEvent<'a> {
    /// A user completed OTP-gated signup
    UserRegistered {
        /// The new account
        user: &'a UserModel,
    },
    /// A user asked for a subscription
    SubscriptionRequested {
        /// The pending subscription
        subscription: &'a SubscriptionModel,
        /// Requesting user
        user: &'a UserModel,
        /// Requested product
        product: &'a ProductModel,
    },
    /// Staff created an active subscription directly
    SubscriptionGranted {
        /// The granted subscription
        subscription: &'a SubscriptionModel,
        /// Receiving user
        user: &'a UserModel,
        /// Granted product
        product: &'a ProductModel,
    },
    /// A user submitted a payment reference
    PaymentSubmitted {
        /// The pending transaction
        transaction: &'a TransactionModel,
        /// Product being paid for
        product: &'a ProductModel,
    },
    /// Staff approved a subscription
    SubscriptionApproved {
        /// Approved subscription
        subscription_id: i64,
        /// Approving admin
        admin_id: i64,
    },
    /// Staff rejected a subscription
    SubscriptionRejected {
        /// Rejected subscription
        subscription_id: i64,
        /// Rejecting admin
        admin_id: i64,
        /// Reason given
        reason: &'a str,
    },
    /// A signal was published
    SignalPublished {
        /// The new signal
        signal: &'a SignalModel,
        /// Its product
        product: &'a ProductModel,
    },
    /// A published signal awaits review
    SignalApprovalRequired {
        /// The signal
        signal: &'a SignalModel,
        /// Its product
        product: &'a ProductModel,
    },
    /// A signal was closed and its P&L committed
    SignalClosed {
        /// The closed signal
        signal: &'a SignalModel,
    },
    /// An admin tried to act outside their scope
    UnauthorizedAccess {
        /// Offending admin
        admin_id: i64,
        /// What they attempted
        action: &'a str,
    },
}

impl NotificationEvent<'_> {
    /// Inbox category for the event
    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::UserRegistered { .. } => NotificationKind::User,
            Self::SubscriptionRequested { .. }
            | Self::SubscriptionGranted { .. }
            | Self::PaymentSubmitted { .. } => NotificationKind::Subscription,
            Self::SignalPublished { .. }
            | Self::SignalApprovalRequired { .. }
            | Self::SignalClosed { .. } => NotificationKind::Signal,
            Self::SubscriptionApproved { .. }
            | Self::SubscriptionRejected { .. }
            | Self::UnauthorizedAccess { .. } => NotificationKind::System,
        }
    }

    /// Id of the entity the notification points at
    #[must_use]
    pub const fn related_id(&self) -> Option<i64> {
        match self {
            Self::UserRegistered { user } => Some(user.id),
            Self::SubscriptionRequested { subscription, .. }
            | Self::SubscriptionGranted { subscription, .. } => Some(subscription.id),
            Self::PaymentSubmitted { transaction, .. } => match transaction.subscription_id {
                Some(id) => Some(id),
                None => Some(transaction.id),
            },
            Self::SubscriptionApproved {
                subscription_id, ..
            }
            | Self::SubscriptionRejected {
                subscription_id, ..
            } => Some(*subscription_id),
            Self::SignalPublished { signal, .. }
            | Self::SignalApprovalRequired { signal, .. }
            | Self::SignalClosed { signal } => Some(signal.id),
            Self::UnauthorizedAccess { admin_id, .. } => Some(*admin_id),
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "New User Registered",
            Self::SubscriptionRequested { .. } => "New Subscription Request",
            Self::SubscriptionGranted { .. } => "Subscription Granted",
            Self::PaymentSubmitted { .. } => "Payment Submitted",
            Self::SubscriptionApproved { .. } => "Approve Successful",
            Self::SubscriptionRejected { .. } => "Reject Successful",
            Self::SignalPublished { .. } => "New Signal Created",
            Self::SignalApprovalRequired { .. } => "Signal Requires Approval",
            Self::SignalClosed { .. } => "Signal Closed",
            Self::UnauthorizedAccess { .. } => "Unauthorized Access Attempt",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::UserRegistered { user } => {
                format!("New user registered: {} ({})", user.full_name, user.email)
            }
            Self::SubscriptionRequested { user, product, .. } => format!(
                "User {} requested subscription for {} (Status: PENDING)",
                user.full_name, product.name
            ),
            Self::SubscriptionGranted {
                subscription,
                user,
                product,
            } => format!(
                "User {} was granted {} by admin #{} (Status: ACTIVE)",
                user.full_name,
                product.name,
                subscription.approved_by.unwrap_or_default()
            ),
            Self::PaymentSubmitted {
                transaction,
                product,
            } => format!(
                "Payment of {} submitted for {} (ref {})",
                transaction.amount, product.name, transaction.payment_reference
            ),
            Self::SubscriptionApproved {
                subscription_id,
                admin_id,
            } => format!("Subscription #{subscription_id} was approved by admin #{admin_id}"),
            Self::SubscriptionRejected {
                subscription_id,
                admin_id,
                reason,
            } => format!(
                "Subscription #{subscription_id} was rejected by admin #{admin_id}: {reason}"
            ),
            Self::SignalPublished { signal, product } => format!(
                "New {} signal for {} in {}",
                signal.signal_type.to_value(),
                signal.symbol,
                product.name
            ),
            Self::SignalApprovalRequired { signal, product } => format!(
                "{} signal for {} in {} requires approval",
                signal.signal_type.to_value(),
                signal.symbol,
                product.name
            ),
            Self::SignalClosed { signal } => format!(
                "{} {} closed with P&L {}",
                signal.signal_type.to_value(),
                signal.symbol,
                signal.profit_loss.unwrap_or(Decimal::ZERO)
            ),
            Self::UnauthorizedAccess { admin_id, action } => {
                format!("Admin #{admin_id} attempted unauthorized action: {action}")
            }
        }
    }
}

/// Inserts one notification row.
///
/// # Errors
/// Returns `Error::Validation` for an empty title, or a database error.
pub async fn create_notification<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    kind: NotificationKind,
    title: &str,
    message: &str,
    related_id: Option<i64>,
) -> Result<admin_notification::Model> {
    if title.trim().is_empty() {
        return Err(Error::validation("Notification title cannot be empty"));
    }

    let row = admin_notification::ActiveModel {
        notification_type: Set(kind),
        title: Set(title.trim().to_string()),
        message: Set(message.to_string()),
        related_id: Set(related_id),
        is_read: Set(false),
        created_at: Set(ctx.now()),
        ..Default::default()
    };
    row.insert(db).await.map_err(Into::into)
}

/// Turns an event into an inbox row. Failures are logged, never returned.
pub async fn dispatch<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    event: NotificationEvent<'_>,
) -> Option<admin_notification::Model> {
    let message = event.message();
    match create_notification(db, ctx, event.kind(), event.title(), &message, event.related_id())
        .await
    {
        Ok(row) => {
            debug!("Notification #{} created ({})", row.id, event.title());
            Some(row)
        }
        Err(e) => {
            error!("Failed to create notification '{}': {}", event.title(), e);
            None
        }
    }
}

/// Acknowledges a notification.
///
/// Returns `Ok(true)` when this call flipped `is_read`, `Ok(false)` if it was
/// already read.
///
/// # Errors
/// Returns `Error::NotFound` for an unknown id.
pub async fn mark_read<C: ConnectionTrait>(db: &C, notification_id: i64) -> Result<bool> {
    let result = AdminNotification::update_many()
        .set(admin_notification::ActiveModel {
            is_read: Set(true),
            ..Default::default()
        })
        .filter(admin_notification::Column::Id.eq(notification_id))
        .filter(admin_notification::Column::IsRead.eq(false))
        .exec(db)
        .await?;

    if result.rows_affected == 1 {
        return Ok(true);
    }
    AdminNotification::find_by_id(notification_id)
        .one(db)
        .await?
        .map(|_| false)
        .ok_or_else(|| Error::not_found("notification", notification_id))
}

/// Acknowledges every unread notification, returning how many were flipped.
pub async fn mark_all_read<C: ConnectionTrait>(db: &C) -> Result<u64> {
    let result = AdminNotification::update_many()
        .set(admin_notification::ActiveModel {
            is_read: Set(true),
            ..Default::default()
        })
        .filter(admin_notification::Column::IsRead.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Number of unread notifications
pub async fn unread_count<C: ConnectionTrait>(db: &C) -> Result<u64> {
    AdminNotification::find()
        .filter(admin_notification::Column::IsRead.eq(false))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Most recent notifications first.
pub async fn list_recent<C: ConnectionTrait>(
    db: &C,
    limit: u64,
) -> Result<Vec<admin_notification::Model>> {
    AdminNotification::find()
        .order_by_desc(admin_notification::Column::CreatedAt)
        .order_by_desc(admin_notification::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_notification_validation() -> Result<()> {
        let env = setup_env().await?;
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result =
            create_notification(&db, &env.ctx, NotificationKind::System, "  ", "body", None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_creates_row_with_type_and_related_id() -> Result<()> {
        let env = setup_env().await?;
        let user = create_test_user(&env, "alice@example.com", "9000000001").await?;

        let row = dispatch(&env.db, &env.ctx, NotificationEvent::UserRegistered { user: &user })
            .await
            .unwrap();

        assert_eq!(row.notification_type, NotificationKind::User);
        assert_eq!(row.related_id, Some(user.id));
        assert!(row.message.contains("alice@example.com"));
        assert!(!row.is_read);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_read_flips_once() -> Result<()> {
        let env = setup_env().await?;
        let row = create_notification(
            &env.db,
            &env.ctx,
            NotificationKind::System,
            "Check",
            "body",
            None,
        )
        .await?;

        assert!(mark_read(&env.db, row.id).await?);
        assert!(!mark_read(&env.db, row.id).await?);
        assert_eq!(unread_count(&env.db).await?, 0);

        let missing = mark_read(&env.db, 9999).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_all_read_and_listing() -> Result<()> {
        let env = setup_env().await?;
        for title in ["one", "two", "three"] {
            create_notification(&env.db, &env.ctx, NotificationKind::Signal, title, "", None)
                .await?;
        }
        assert_eq!(unread_count(&env.db).await?, 3);

        let recent = list_recent(&env.db, 2).await?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].title, "three");

        assert_eq!(mark_all_read(&env.db).await?, 3);
        assert_eq!(mark_all_read(&env.db).await?, 0);
        Ok(())
    }
}
