use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow};
use checkers_server::{
    ai::{CheckersAi, Searcher, checkers::decide, machine::machine_component},
    checkers::{Rules, Size, State},
    client::GameClient,
    config::{AiConfig, ClientConfig, DEFAULT_PORT, SessionContext},
    network::lan::{self, DEFAULT_DISCOVERY_WINDOW, DISCOVERY_PORT},
    protocol::Secret,
    server::Server,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "checkers-ai", version, about)]
struct Args {
    /// Game server address
    #[arg(short, long, value_name = "ADDRESS", default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
    server: SocketAddr,
    /// Join the first server advertised on the LAN
    #[arg(short, long, conflicts_with = "server")]
    discover: bool,
    /// Host a local game and play both sides
    #[arg(short, long, conflicts_with_all = ["server", "discover"])]
    local: bool,
    /// Print the decision for a JSON encoded state and exit
    #[arg(short, long, value_name = "FILE")]
    analyze: Option<PathBuf>,
    /// Minimum search depth
    #[arg(long, value_name = "PLIES", default_value_t = AiConfig::default().min_depth)]
    min_depth: usize,
    /// Maximum search depth
    #[arg(long, value_name = "PLIES", default_value_t = AiConfig::default().max_depth)]
    max_depth: usize,
    /// Time budget of one decision, 0 for none
    #[arg(long, value_name = "MILLISECONDS", default_value_t = 2000)]
    budget_ms: u64,
    /// Derive the search depth from the position value
    #[arg(long)]
    adaptive: bool,
    /// Board width of a local game
    #[arg(long, value_name = "CELLS", default_value_t = Size::default().width)]
    width: u8,
    /// Board height of a local game
    #[arg(long, value_name = "CELLS", default_value_t = Size::default().height)]
    height: u8,
    /// Maximum number of turns of a local game
    #[arg(short = 'n', long, value_name = "N", default_value_t = 200)]
    max_turns: usize,
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
    fn rules(&self) -> Rules {
        Rules {
            mandatory_capture: !self.no_mandatory_capture,
            pawn_jump_forward_only: !self.pawns_jump_backward,
        }
    }

    fn ai(&self) -> AiConfig {
        AiConfig {
            min_depth: self.min_depth,
            max_depth: self.max_depth.max(self.min_depth),
            budget: (self.budget_ms > 0).then(|| Duration::from_millis(self.budget_ms)),
            adaptive: self.adaptive,
            ..AiConfig::default()
        }
    }
}

/// Searches a single position read from `path`
fn analyze(path: &PathBuf, config: &AiConfig) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let state: State = serde_json::from_str(&text).with_context(|| "Failed to parse state")?;

    let mut searcher = Searcher::new(CheckersAi::new(state.size()), config.table_capacity);
    let result = decide(&mut searcher, &state, config)?;
    log::debug!("Searched {} nodes", searcher.nodes());

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Plays a whole game through the client and waits for it to end
async fn play(config: &ClientConfig, ai: AiConfig) -> Result<()> {
    let client = GameClient::connect_with(config, |state| {
        vec![machine_component(state.clone(), ai)]
    })
    .await
    .with_context(|| format!("Failed to join {}", config.server))?;
    log::info!("Joined {}", config.server);

    client.wait_closed().await
}

/// Hosts an internal game on a free loopback port and plays it
async fn play_local(context: SessionContext) -> Result<()> {
    let server = Server::bind(context.server).await?;
    let client = ClientConfig {
        server: server.local_addr()?,
        ..context.client
    };

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.run(cancel.clone()));

    let played = play(&client, context.ai).await;
    if played.is_err() {
        cancel.cancel();
    }
    let result = handle.await.with_context(|| "Server task failed")??;
    played?;

    match result {
        Some(result) => println!("{result}"),
        None => println!("Game did not start"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();
    log::debug!("Command line arguments: {args:?}");
    let ai = args.ai();

    if let Some(path) = &args.analyze {
        return analyze(path, &ai);
    }

    if args.local {
        let mut context =
            SessionContext::local(Size::new(args.width, args.height), args.rules(), ai);
        context.server.max_turns = Some(args.max_turns);
        context.server.secret = args.secret.clone();
        context.client.secret = args.secret;
        return play_local(context).await;
    }

    let server = if args.discover {
        log::info!("Looking for servers on the LAN");
        let servers = lan::discover(DISCOVERY_PORT, DEFAULT_DISCOVERY_WINDOW).await?;
        let found = servers
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No server found on the LAN"))?;
        log::info!("Found {:?} at {}", found.motd, found.address);
        found.address
    } else {
        args.server
    };

    let config = ClientConfig {
        server,
        rules: args.rules(),
        secret: args.secret,
        ..ClientConfig::default()
    };
    play(&config, ai).await
}
