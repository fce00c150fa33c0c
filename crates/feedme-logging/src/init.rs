//! Process-global `tracing` subscriber installation.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Output format for the installed subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, for local development.
    #[default]
    Pretty,
    /// Newline-delimited JSON, for ingestion by a log collector.
    Json,
}

/// Install a process-global `tracing` subscriber.
///
/// The filter defaults to `info` and honours the `RUST_LOG` environment
/// variable when set. Calling this more than once per process is a logic
/// error in the caller, not in this function; the second call is a no-op
/// because `tracing` subscribers can only be set once globally.
pub fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).try_init(),
    };

    if let Err(err) = result {
        eprintln!("tracing subscriber already installed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_pretty() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn init_does_not_panic_on_repeated_calls() {
        init_tracing(LogFormat::Pretty);
        init_tracing(LogFormat::Json);
    }
}
