//! User accounts - OTP-gated registration and purge.

use crate::{
    core::{
        collaborators::CoreContext,
        notification::{self, NotificationEvent},
        otp,
    },
    entities::{Subscription, SubscriptionStatus, Transaction, User, subscription, transaction, user},
    errors::{Error, Result, is_unique_violation},
};
use sea_orm::{Condition, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument, warn};

/// Signup details. `password_hash` comes from the login layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Display name, letters and spaces
    pub full_name: String,
    /// 10 to 15 digits
    pub mobile: String,
    /// Must already be OTP-verified
    pub email: String,
    /// Credential hash
    pub password_hash: String,
}

fn validate_name(raw: &str) -> Result<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.len() < 2 || !name.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(Error::validation(
            "Full name must be at least 2 characters and contain only letters",
        ));
    }
    Ok(name)
}

fn validate_mobile(raw: &str) -> Result<String> {
    let mobile = raw.trim();
    if !(10..=15).contains(&mobile.len()) || !mobile.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation("Mobile number must be 10 to 15 digits"));
    }
    Ok(mobile.to_string())
}

async fn ensure_unique<C: ConnectionTrait>(db: &C, mobile: &str, email: &str) -> Result<()> {
    let clash = User::find()
        .filter(
            Condition::any()
                .add(user::Column::Mobile.eq(mobile))
                .add(user::Column::Email.eq(email)),
        )
        .one(db)
        .await?;
    match clash {
        Some(existing) if existing.email == email => Err(Error::Duplicate { field: "email" }),
        Some(_) => Err(Error::Duplicate { field: "mobile" }),
        None => Ok(()),
    }
}

/// Creates an account for an email that has passed OTP verification.
///
/// # Errors
/// - `Error::Validation` for a malformed name, mobile, email or empty hash
/// - `Error::EmailNotVerified` unless the email was verified within the
///   freshness window
/// - `Error::Duplicate` if the mobile or email is taken
#[instrument(skip(db, ctx, new), fields(email = %new.email))]
pub async fn register_user<C: ConnectionTrait>(
    db: &C,
    ctx: &CoreContext,
    new: NewUser,
) -> Result<user::Model> {
    let full_name = validate_name(&new.full_name)?;
    let mobile = validate_mobile(&new.mobile)?;
    let email = otp::normalize_email(&new.email)?;
    if new.password_hash.is_empty() {
        return Err(Error::validation("Password hash is required"));
    }

    if !otp::is_email_verified(db, ctx, &email).await? {
        warn!("Registration attempted for unverified email {}", email);
        return Err(Error::EmailNotVerified { email });
    }
    ensure_unique(db, &mobile, &email).await?;

    let row = user::ActiveModel {
        full_name: Set(full_name),
        mobile: Set(mobile.clone()),
        email: Set(email.clone()),
        password_hash: Set(new.password_hash),
        email_verified: Set(true),
        is_active: Set(true),
        created_at: Set(ctx.now()),
        ..Default::default()
    };
    let created = match row.insert(db).await {
        Ok(created) => created,
        // Lost a race with a concurrent signup
        Err(e) if is_unique_violation(&e) => {
            ensure_unique(db, &mobile, &email).await?;
            return Err(Error::Duplicate { field: "email" });
        }
        Err(e) => return Err(e.into()),
    };
    info!("Registered user #{} ({})", created.id, created.email);

    notification::dispatch(db, ctx, NotificationEvent::UserRegistered { user: &created }).await;
    Ok(created)
}

/// Deletes a user with their transactions and closed subscriptions.
///
/// # Errors
/// - `Error::NotFound` for an unknown user
/// - `Error::OpenSubscriptions` while any subscription is pending or active
#[instrument(skip(db))]
pub async fn purge_user(db: &DatabaseConnection, user_id: i64) -> Result<()> {
    let txn = db.begin().await?;
    User::find_by_id(user_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("user", user_id))?;

    let open = Subscription::find()
        .filter(subscription::Column::UserId.eq(user_id))
        .filter(
            subscription::Column::Status
                .is_in([SubscriptionStatus::Pending, SubscriptionStatus::Active]),
        )
        .count(&txn)
        .await?;
    if open > 0 {
        return Err(Error::OpenSubscriptions { user_id });
    }

    let transactions = Transaction::delete_many()
        .filter(transaction::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?
        .rows_affected;
    let subscriptions = Subscription::delete_many()
        .filter(subscription::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?
        .rows_affected;
    User::delete_by_id(user_id).exec(&txn).await?;
    txn.commit().await?;

    info!(
        "Purged user #{} with {} subscriptions and {} transactions",
        user_id, subscriptions, transactions
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::subscription::{cancel_subscription, create_subscription, grant_subscription};
    use crate::entities::{AdminNotification, NotificationKind};
    use crate::test_utils::*;
    use rust_decimal_macros::dec;

    fn alice() -> NewUser {
        NewUser {
            full_name: "Alice  Smith".to_string(),
            mobile: "9000000001".to_string(),
            email: "Alice@Example.com".to_string(),
            password_hash: "argon2-hash".to_string(),
        }
    }

    async fn verify(env: &TestEnv, email: &str) -> Result<()> {
        otp::request_otp(&env.db, &env.ctx, email).await?;
        otp::verify_otp(&env.db, &env.ctx, email, TEST_OTP_CODE).await
    }

    #[tokio::test]
    async fn test_registration_requires_verified_email() -> Result<()> {
        let env = setup_env().await?;
        let result = register_user(&env.db, &env.ctx, alice()).await;
        assert!(matches!(result, Err(Error::EmailNotVerified { .. })));

        verify(&env, "alice@example.com").await?;
        let user = register_user(&env.db, &env.ctx, alice()).await?;
        assert_eq!(user.full_name, "Alice Smith");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.email_verified);

        let rows = AdminNotification::find().all(&env.db).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].notification_type, NotificationKind::User);
        assert_eq!(rows[0].related_id, Some(user.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_registration_survives_third_party_resend() -> Result<()> {
        let env = setup_env().await?;
        verify(&env, "alice@example.com").await?;
        env.clock.advance(chrono::Duration::seconds(31));

        let resend = otp::request_otp(&env.db, &env.ctx, "alice@example.com").await;
        assert!(matches!(resend, Err(Error::AlreadyVerified { .. })));

        let user = register_user(&env.db, &env.ctx, alice()).await?;
        assert_eq!(user.email, "alice@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_verification_cannot_register() -> Result<()> {
        let env = setup_env().await?;
        verify(&env, "alice@example.com").await?;
        env.clock.advance(chrono::Duration::days(365));

        let result = register_user(&env.db, &env.ctx, alice()).await;
        assert!(matches!(result, Err(Error::EmailNotVerified { .. })));
        assert_eq!(User::find().count(&env.db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_fields() -> Result<()> {
        let env = setup_env().await?;
        verify(&env, "alice@example.com").await?;
        register_user(&env.db, &env.ctx, alice()).await?;

        let same_email = register_user(
            &env.db,
            &env.ctx,
            NewUser {
                mobile: "9000000002".to_string(),
                ..alice()
            },
        )
        .await;
        assert!(matches!(same_email, Err(Error::Duplicate { field: "email" })));

        verify(&env, "bob@example.com").await?;
        let same_mobile = register_user(
            &env.db,
            &env.ctx,
            NewUser {
                email: "bob@example.com".to_string(),
                ..alice()
            },
        )
        .await;
        assert!(matches!(same_mobile, Err(Error::Duplicate { field: "mobile" })));
        Ok(())
    }

    #[test]
    fn test_field_validation() {
        assert!(validate_name("A").is_err());
        assert!(validate_name("R2D2").is_err());
        assert!(validate_name("  José   Núñez ").is_ok());
        assert!(validate_mobile("12345").is_err());
        assert!(validate_mobile("90000-00001").is_err());
        assert!(validate_mobile(" 919000000001 ").is_ok());
    }

    #[tokio::test]
    async fn test_purge_blocked_by_open_subscriptions() -> Result<()> {
        let env = setup_env().await?;
        let user = create_test_user(&env, "alice@example.com", "9000000001").await?;
        let product = create_test_product(&env, "Gold", dec!(999.00), 30).await?;
        create_subscription(&env.db, &env.ctx, user.id, product.id).await?;

        let blocked = purge_user(&env.db, user.id).await;
        assert!(matches!(blocked, Err(Error::OpenSubscriptions { .. })));
        assert!(User::find_by_id(user.id).one(&env.db).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_purge_removes_closed_history() -> Result<()> {
        let env = setup_env().await?;
        let user = create_test_user(&env, "alice@example.com", "9000000001").await?;
        let product = create_test_product(&env, "Gold", dec!(999.00), 30).await?;
        let root = create_test_superadmin(&env).await?;
        let granted = grant_subscription(&env.db, &env.ctx, root.id, user.id, product.id).await?;
        cancel_subscription(&env.db, granted.id).await?;

        purge_user(&env.db, user.id).await?;
        assert!(User::find_by_id(user.id).one(&env.db).await?.is_none());
        assert_eq!(Subscription::find().count(&env.db).await?, 0);

        let missing = purge_user(&env.db, user.id).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }
}
