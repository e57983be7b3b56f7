use clap::Parser;
use segdl_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Prefer the log file; a read-only state dir still gets stderr logs.
    if let Err(err) = logging::init_logging(cli.verbose) {
        logging::init_logging_stderr(cli.verbose);
        tracing::warn!("file logging unavailable: {err:#}");
    }

    if let Err(err) = cli.run().await {
        eprintln!("segdl error: {:#}", err);
        std::process::exit(1);
    }
}
