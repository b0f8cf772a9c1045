//! finadvisor - multi-agent financial advisor.

use clap::Parser;
use std::process::ExitCode;

use finadvisor::{logging, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse first so --help and --version never touch the log directory.
    let args = Commands::parse();

    // Initialize logging; the guard flushes the file writer on exit.
    let _guard = match logging::init("finadvisor.log") {
        Ok((guard, _dir)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
