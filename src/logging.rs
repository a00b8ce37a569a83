//! Diagnostic logging to stderr.
//!
//! Command output goes to stdout through the session writer, so tracing
//! output is kept on stderr where it never interleaves with node output.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise each `-v` raises the level by one.
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new("fleetsh=warn"),
            1 => EnvFilter::new("fleetsh=info"),
            2 => EnvFilter::new("fleetsh=debug"),
            _ => EnvFilter::new("fleetsh=trace"),
        }
    }
}

pub fn init_logging(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(create_env_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
