// ABOUTME: tracing-subscriber setup for the sandclaw binary.
// ABOUTME: Logs go to stderr so stdout stays clean for command output and JSON reports.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive, e.g. `sandclaw=debug`.
pub const LOG_ENV: &str = "SANDCLAW_LOG";

/// Filter used when `SANDCLAW_LOG` is unset or invalid.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
