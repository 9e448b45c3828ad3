use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use anyhow::{Context, Result};
use checkers_server::{
    checkers::{Rules, Size},
    config::{DEFAULT_MAX_CLIENTS, DEFAULT_MOTD, DEFAULT_PORT, ServerConfig},
    network::DEFAULT_READ_TIMEOUT,
    protocol::Secret,
    server::Server,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "checkers-server", version, about)]
struct Args {
    /// Host IP address
    #[arg(long, value_name = "ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    host: IpAddr,
    /// TCP port, 0 picks a free one
    #[arg(short, long, value_name = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Board width
    #[arg(long, value_name = "CELLS", default_value_t = Size::default().width)]
    width: u8,
    /// Board height
    #[arg(long, value_name = "CELLS", default_value_t = Size::default().height)]
    height: u8,
    /// Maximum number of simultaneous clients
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,
    /// Message shown to LAN clients
    #[arg(long, default_value = DEFAULT_MOTD)]
    motd: String,
    /// Do not advertise the game on the LAN
    #[arg(long)]
    no_advertise: bool,
    /// Single client controlling both sides
    #[arg(short, long)]
    singleplayer: bool,
    /// Seed of the starting turn draw
    #[arg(long)]
    seed: Option<u64>,
    /// Maximum number of turns
    #[arg(short = 'n', long, value_name = "N")]
    max_turns: Option<usize>,
    /// Read timeout of client connections
    #[arg(short, long, value_name = "SECONDS", default_value_t = DEFAULT_READ_TIMEOUT.as_secs())]
    timeout: u64,
    /// Allow simple moves while a jump is available
    #[arg(long)]
    no_mandatory_capture: bool,
    /// Let pawns jump backward
    #[arg(long)]
    pawns_jump_backward: bool,
    /// Stream encryption key and IV as hex digits
    #[arg(long, value_name = "HEX", value_parser = Secret::from_hex)]
    secret: Option<Secret>,
}

impl Args {
    fn config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            max_clients: self.max_clients,
            size: Size::new(self.width, self.height),
            rules: Rules {
                mandatory_capture: !self.no_mandatory_capture,
                pawn_jump_forward_only: !self.pawns_jump_backward,
            },
            internal: self.singleplayer,
            motd: self.motd,
            advertise: !self.no_advertise,
            read_timeout: Duration::from_secs(self.timeout),
            seed: self.seed,
            max_turns: self.max_turns,
            secret: self.secret,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();
    log::debug!("Command line arguments: {args:?}");
    let config = args.config();

    let server = Server::bind(config)
        .await
        .with_context(|| "Failed to start server")?;
    log::info!("Listening at {}", server.local_addr()?);

    // Stop on Ctrl-C
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, shutting down");
                cancel.cancel();
            }
        }
    });

    match server.run(cancel).await? {
        Some(result) => println!("{result}"),
        None => println!("Game did not start"),
    }

    Ok(())
}
