//! Tracing subscriber setup.
//!
//! Log lines go to stderr so that CLI output on stdout stays parseable.
//! Levels come from the `[logging]` section; `RUST_LOG` takes precedence:
//!
//! ```bash
//! RUST_LOG=brainstore=debug,sqlx=warn brainstore serve
//! ```

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Build the filter directive string for `config`: `"info,brainstore=debug"`.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    for (module, level) in &config.modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter);

        // A subscriber installed elsewhere (e.g. by a test harness) wins.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

pub fn init() {
    init_with_config(&LoggingConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_filter_directives_appends_modules() {
        let mut modules = BTreeMap::new();
        modules.insert("brainstore".to_string(), "debug".to_string());
        modules.insert("sqlx".to_string(), "warn".to_string());
        let config = LoggingConfig {
            default: "info".into(),
            modules,
        };
        assert_eq!(
            filter_directives(&config),
            "info,brainstore=debug,sqlx=warn"
        );
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init();
        init();
    }
}
