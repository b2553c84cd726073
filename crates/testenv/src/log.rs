//! Logging for spanner-testenv.
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::{OffsetTime, UtcTime};

const DEFAULT_FILTER: &str =
    "spanner_testenv=info,spanner_testenv_core=info,spanner_testenv_rest=warn";
const VERBOSE_FILTER: &str =
    "spanner_testenv=debug,spanner_testenv_core=debug,spanner_testenv_rest=debug";

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Initializes logging to stderr so that stdout stays free for command
/// output. `RUST_LOG` overrides the built-in filter.
///
/// Call before any thread is spawned, otherwise timestamps fall back to UTC.
pub fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match OffsetTime::local_rfc_3339() {
        Ok(timer) => builder.with_timer(timer).init(),
        Err(_) => builder.with_timer(UtcTime::rfc_3339()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(default_filter(verbose)).is_ok());
        }
        assert!(default_filter(true).contains("spanner_testenv_core=debug"));
    }
}
