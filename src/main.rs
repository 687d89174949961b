// ABOUTME: Entry point for sandclaw, a command-risk sandbox for shell commands.
// ABOUTME: Loads .env and config, parses CLI args, installs logging, and dispatches.

use clap::Parser;

use sandclaw::cli::{self, Cli, EXIT_ERROR};
use sandclaw::config::Config;
use sandclaw::logging::init_logging;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("sandclaw: {e:#}");
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = Config::load()?;
    cli.apply_overrides(&mut config);
    tracing::debug!(
        home = %config.storage.home.display(),
        security_level = %config.sandbox.security_level,
        "configuration loaded"
    );
    cli::run(cli, config).await
}
