//! Runtime configuration of servers, clients and machine players.
//!
//! Nothing here is global: entry points build a [`SessionContext`] and pass
//! it down.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use crate::{
    checkers::{Rules, Size},
    network::DEFAULT_READ_TIMEOUT,
    protocol::Secret,
};

/// Default TCP game port
pub const DEFAULT_PORT: u16 = 31613;
/// Maximum number of simultaneous clients
pub const DEFAULT_MAX_CLIENTS: usize = 4;
/// Number of players needed to start a game
pub const PLAYERS_TO_START: usize = 2;
/// Idle interval after which the server sends a heartbeat
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Capacity of the outbound queue of a connection
pub const CONNECTION_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_MOTD: &str = "Checkers";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// `0` picks a free port
    pub port: u16,
    pub max_clients: usize,
    pub size: Size,
    pub rules: Rules,
    /// Single local client controlling both sides
    pub internal: bool,
    pub motd: String,
    /// Multicast LAN advertisements while waiting for players
    pub advertise: bool,
    pub heartbeat_interval: Duration,
    pub read_timeout: Duration,
    /// Seed of the starting turn draw
    pub seed: Option<u64>,
    /// Ends the game without a winner after this many turns
    pub max_turns: Option<usize>,
    pub secret: Option<Secret>,
}

impl ServerConfig {
    /// Players needed before the game starts
    pub fn start_threshold(&self) -> usize {
        if self.internal { 1 } else { PLAYERS_TO_START }
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            size: Size::default(),
            rules: Rules::default(),
            internal: false,
            motd: DEFAULT_MOTD.to_string(),
            advertise: true,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
            seed: None,
            max_turns: None,
            secret: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddr,
    /// Rules of the hosted game, needed to replay actions on the replica
    pub rules: Rules,
    pub read_timeout: Duration,
    pub secret: Option<Secret>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            rules: Rules::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            secret: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub min_depth: usize,
    pub max_depth: usize,
    /// Wall-clock budget of one decision
    pub budget: Option<Duration>,
    /// Derive the search depth from the position value
    pub adaptive: bool,
    /// Entries kept in the transposition table
    pub table_capacity: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            min_depth: 2,
            max_depth: 6,
            budget: Some(Duration::from_secs(2)),
            adaptive: false,
            table_capacity: 1 << 20,
        }
    }
}

/// Configuration threaded through the entry points of one session
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub ai: AiConfig,
}

impl SessionContext {
    /// Session of a local game against the machine: internal server on a free
    /// loopback port, single machine client
    pub fn local(size: Size, rules: Rules, ai: AiConfig) -> Self {
        Self {
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
                size,
                rules,
                internal: true,
                advertise: false,
                ..ServerConfig::default()
            },
            client: ClientConfig {
                rules,
                ..ClientConfig::default()
            },
            ai,
        }
    }
}
