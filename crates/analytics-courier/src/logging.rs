//! Logging bootstrap for hosts that do not install their own subscriber.
//!
//! The library itself only emits `tracing` events. Hosts that already run a
//! subscriber can ignore this module.

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format for [`init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Used when `RUST_LOG` is unset or invalid.
    pub default_level: String,
    pub format: LogFormat,
    pub with_target: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            format: LogFormat::Compact,
            with_target: true,
        }
    }
}

/// Install a global fmt subscriber.
///
/// Returns `false` when a global subscriber was already set.
pub fn init_logging(settings: &LogSettings) -> bool {
    let filter = env_filter(&settings.default_level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(settings.with_target);

    let installed = match settings.format {
        LogFormat::Compact => builder.compact().finish().try_init(),
        LogFormat::Json => builder.json().finish().try_init(),
    };
    installed.is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
