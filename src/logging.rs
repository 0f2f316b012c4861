//! Diagnostic logging setup.
//!
//! User-facing output goes through the progress reporter on stdout; tracing
//! diagnostics are written to stderr so they never interleave with it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the logging system.
///
/// The log level can be controlled via the `RUST_LOG` environment variable.
/// Otherwise `pdfcast` logs at WARN, or DEBUG when `verbose` is set, and
/// other crates at WARN.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "pdfcast=debug,warn"
        } else {
            "pdfcast=warn,warn"
        })
    });

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
