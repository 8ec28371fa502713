#![cfg(not(tarpaulin_include))]

use clap::Parser;
use log::error;
use sample_intake::app;
use sample_intake::config::{Args, init_logging};

/// Main entry point for the web application
///
/// Loads `.env`, parses the configuration and opens the store before the
/// async runtime starts, since the sheet client does blocking I/O.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        return Err(e.into());
    }
    let store = args.open_store()?;

    tokio::runtime::Runtime::new()?.block_on(app::run(args, store))
}
