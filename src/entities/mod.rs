//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod admin;
pub mod admin_notification;
pub mod captcha_challenge;
pub mod email_verification_otp;
pub mod otp_send_log;
pub mod product;
pub mod setting;
pub mod signal;
pub mod subscription;
pub mod transaction;
pub mod user;

use rust_decimal::Decimal;

/// Largest amount a `Decimal(10,2)` money column holds
#[must_use]
pub fn max_money() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

// Re-export specific types to avoid conflicts
pub use admin::{AdminRole, Column as AdminColumn, Entity as Admin, Model as AdminModel};
pub use admin_notification::{
    Column as AdminNotificationColumn, Entity as AdminNotification,
    Model as AdminNotificationModel, NotificationKind,
};
pub use captcha_challenge::{
    Column as CaptchaChallengeColumn, Entity as CaptchaChallenge, Model as CaptchaChallengeModel,
};
pub use email_verification_otp::{
    Column as EmailVerificationOtpColumn, Entity as EmailVerificationOtp,
    Model as EmailVerificationOtpModel,
};
pub use otp_send_log::{Column as OtpSendLogColumn, Entity as OtpSendLog, Model as OtpSendLogModel};
pub use product::{Column as ProductColumn, Entity as Product, Model as ProductModel};
pub use setting::{Column as SettingColumn, Entity as Setting, Model as SettingModel};
pub use signal::{
    ApprovalStatus, Column as SignalColumn, Entity as Signal, Model as SignalModel, SignalStatus,
    SignalType,
};
pub use subscription::{
    Column as SubscriptionColumn, Entity as Subscription, Model as SubscriptionModel,
    PaymentStatus, SubscriptionStatus,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
    TransactionStatus,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
