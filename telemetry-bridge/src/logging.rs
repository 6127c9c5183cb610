//! Diagnostics for a process that runs for weeks inside a screen session.
//!
//! Readings and channel entries are printed on stdout; everything logged
//! here goes to stderr with a timestamp, so the two can be split apart.

use tracing_subscriber::EnvFilter;

/// The HTTP client stack is noisy at debug.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn";

/// Directives used when `RUST_LOG` is unset.
pub fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("{},{}", level, QUIET_DEPENDENCIES)
}

pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives(false),
            "info,hyper=warn,hyper_util=warn,reqwest=warn"
        );
        assert!(default_directives(true).starts_with("debug,"));
        assert!(EnvFilter::try_new(default_directives(true)).is_ok());
    }
}
