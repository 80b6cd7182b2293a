//! Core application plumbing: configuration and logging

/// Application configuration
pub mod config;

/// Logging macros and subscriber setup
pub mod logging;

// Re-export commonly used items
pub use config::{load_config, load_config_or_default, Config, JournalConfig, LoggingConfig, RegistryConfig};
pub use logging::init_logging;
