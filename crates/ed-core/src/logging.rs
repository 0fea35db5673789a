//! Logging setup

use crate::config::DebugConfig;
use tracing_subscriber::EnvFilter;

/// Filter directives for the configured debug settings
pub fn directives(debug: &DebugConfig) -> String {
    let level = debug.log_level.as_filter();
    if debug.trace_transfers {
        format!("{},ed_dmac=trace", level)
    } else {
        level.to_string()
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// is harmless; the second call is ignored.
pub fn init(debug: &DebugConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(debug)));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_directives() {
        let mut debug = DebugConfig::default();
        assert_eq!(directives(&debug), "info");

        debug.log_level = LogLevel::Warn;
        debug.trace_transfers = true;
        assert_eq!(directives(&debug), "warn,ed_dmac=trace");
    }
}
