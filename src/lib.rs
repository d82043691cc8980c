// Configuration (TOML file + environment)
pub mod config;

// Credential record stored per user
pub mod credentials;

// Token persistence backends
pub mod storage;

// HTTP routes
pub mod api;
