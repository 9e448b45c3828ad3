use std::time::Duration;

use anyhow::{Context, Result};
use checkers_server::network::lan::{self, DEFAULT_DISCOVERY_WINDOW, DISCOVERY_PORT};
use clap::Parser;
use itertools::Itertools;

#[derive(Debug, Parser)]
#[command(name = "checkers-lan", version, about)]
struct Args {
    /// UDP port the advertisements are sent to
    #[arg(short, long, value_name = "PORT", default_value_t = DISCOVERY_PORT)]
    port: u16,
    /// How long to listen for advertisements
    #[arg(short, long, value_name = "MILLISECONDS", default_value_t = DEFAULT_DISCOVERY_WINDOW.as_millis() as u64)]
    window: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();
    log::debug!("Command line arguments: {args:?}");

    let servers = lan::discover(args.port, Duration::from_millis(args.window))
        .await
        .with_context(|| "Failed to listen for advertisements")?;

    if servers.is_empty() {
        println!("No servers found");
        return Ok(());
    }
    println!(
        "{}",
        servers
            .iter()
            .map(|server| format!("{}\t{}", server.address, server.motd))
            .join("\n")
    );

    Ok(())
}
