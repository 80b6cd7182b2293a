//! Logging utilities
//!
//! Thin macros over the tracing crate so call sites stay uniform, plus the
//! subscriber setup driven by [`LoggingConfig`].

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::config::LoggingConfig;
use crate::types::{Error, Result};

/// Logging macros with a clean API
pub mod logging {

    /// Info level logging - general information messages
    #[macro_export]
    macro_rules! log_info {
        ($($arg:tt)*) => {{
            tracing::info!($($arg)*);
        }};
    }

    /// Warning level logging - potentially problematic situations
    #[macro_export]
    macro_rules! log_warn {
        ($($arg:tt)*) => {{
            tracing::warn!($($arg)*);
        }};
    }

    /// Error level logging - error conditions
    #[macro_export]
    macro_rules! log_error {
        ($($arg:tt)*) => {{
            tracing::error!($($arg)*);
        }};
    }

    /// Debug level logging - detailed information for debugging
    #[macro_export]
    macro_rules! log_debug {
        ($($arg:tt)*) => {{
            tracing::debug!($($arg)*);
        }};
    }

    /// Trace level logging - very detailed tracing information
    #[macro_export]
    macro_rules! log_trace {
        ($($arg:tt)*) => {{
            tracing::trace!($($arg)*);
        }};
    }
}

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// is an error because the global subscriber can only be set once.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("Invalid log filter '{}': {}", config.level, e)))?;

    fmt_subscriber(filter, &config.format, std::io::stdout)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to install subscriber: {}", e)))?;
    crate::log_info!("Initialized {} v{}", crate::NAME, crate::VERSION);
    Ok(())
}

/// fmt subscriber for `format` (pretty or compact) writing to `writer`
fn fmt_subscriber<W>(filter: EnvFilter, format: &str, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer);
    match format {
        "compact" => Box::new(builder.compact().finish()),
        "pretty" => Box::new(builder.pretty().finish()),
        _ => Box::new(builder.finish()),
    }
}
