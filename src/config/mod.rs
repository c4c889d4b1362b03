/// Database configuration and connection management
pub mod database;

/// Verification settings: file defaults, table overrides, cached snapshot
pub mod settings;
