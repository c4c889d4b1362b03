/// Admin role and product scope checks
pub mod authz;
/// Single-use CAPTCHA challenges
pub mod captcha;
/// Clock, randomness, hashing and delivery collaborators
pub mod collaborators;
/// Staff notification inbox
pub mod notification;
/// OTP issuance and verification
pub mod otp;
/// Payment attempts and settlement
pub mod payment;
/// Products and their terms
pub mod product;
/// OTP send rate limiter
pub mod rate_limit;
/// Retention sweep for verification data
pub mod retention;
/// Key/value settings store
pub mod settings;
/// Signal lifecycle and P&L
pub mod signal;
/// Subscription lifecycle
pub mod subscription;
/// User registration and purge
pub mod user;
