// Build-time identity from Cargo.toml

/// Service version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name (from Cargo.toml).
pub const NAME: &str = env!("CARGO_PKG_NAME");
