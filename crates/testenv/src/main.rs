use anyhow::Context;
use clap::Parser;
use spanner_testenv::cli::{Cli, run_app};
use spanner_testenv::log::setup_logging;
use spanner_testenv::ux;

fn main() {
    let cli = Cli::parse();
    // The local offset can only be read while the process is single threaded.
    setup_logging(cli.verbose);

    let result = tokio::runtime::Runtime::new()
        .context("Failed to start the async runtime")
        .and_then(|runtime| runtime.block_on(run_app(cli)));
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            ux::present_error(e);
            std::process::exit(1);
        }
    }
}
