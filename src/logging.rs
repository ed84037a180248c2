//! Tracing subscriber setup for binaries and tests embedding the library.

use tracing::Level;
use tracing_subscriber::EnvFilter;

fn filter(verbose: u8, quiet: bool) -> EnvFilter {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let filter = EnvFilter::from_default_env();
    match format!("hostdelta={}", level).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Installs a `fmt` subscriber. `RUST_LOG` directives are honored and
/// the crate's own level follows `verbose`/`quiet`.
///
/// Panics if a global subscriber is already set; use `try_init_logging`
/// when that can happen.
pub fn init_logging(verbose: u8, quiet: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, quiet))
        .with_target(false)
        .init();
}

/// Like `init_logging`, but returns `false` instead of panicking when a
/// subscriber is already installed.
pub fn try_init_logging(verbose: u8, quiet: bool) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, quiet))
        .with_target(false)
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_is_repeatable() {
        try_init_logging(1, false);
        assert!(!try_init_logging(0, true));
    }

    #[test]
    fn test_filter_levels() {
        assert!(filter(0, true).to_string().to_lowercase().contains("hostdelta=error"));
        assert!(filter(2, false).to_string().to_lowercase().contains("hostdelta=trace"));
    }
}
