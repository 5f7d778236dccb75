//! InputBridge - hand messages typed in a browser to a waiting agent.
//!
//! This is the main entry point.

use clap::Parser;

use inputbridge::cli::Commands;
use inputbridge::logging;

#[tokio::main]
async fn main() {
    // Initialize logging
    let (guard, _log_dir) = match logging::init() {
        Ok(init) => init,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    // Parse command line arguments
    let args = Commands::parse();

    // Run the command
    let code = match args.run().await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            1
        }
    };

    // The stdin reader may still be parked in a blocking read, so exit
    // without waiting for the runtime to wind down.
    drop(guard);
    std::process::exit(code);
}
