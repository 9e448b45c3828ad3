//! LAN advertisement and discovery over UDP multicast.
//!
//! A hosting server periodically multicasts
//! `[AD]<port>[/AD][CHECKERS]<motd>[/CHECKERS]`; clients listen on the
//! group for a short window and collect the announced servers.

use std::{
    collections::BTreeMap,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{net::UdpSocket, time::Instant};
use tokio_util::sync::CancellationToken;

pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 2, 60);
pub const DISCOVERY_PORT: u16 = 4445;
pub const ADVERTISE_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_secs(3);

const MAX_DATAGRAM_LENGTH: usize = 1024;

/// Advertisement datagram text
pub fn advertisement(port: u16, motd: &str) -> String {
    format!("[AD]{port}[/AD][CHECKERS]{motd}[/CHECKERS]")
}

/// Parses an advertisement into `(port, motd)`
pub fn parse_advertisement(text: &str) -> Option<(u16, String)> {
    let (port, rest) = text.strip_prefix("[AD]")?.split_once("[/AD]")?;
    let (motd, _) = rest.strip_prefix("[CHECKERS]")?.split_once("[/CHECKERS]")?;
    Some((port.trim().parse().ok()?, motd.to_string()))
}

/// Server found on the LAN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub motd: String,
    /// Sender address with the advertised game port
    pub address: SocketAddr,
}

/// Periodic advertisement of a hosted game
#[derive(Debug, Clone)]
pub struct Advertiser {
    datagram: String,
    target: SocketAddr,
    interval: Duration,
}

impl Advertiser {
    pub fn new(port: u16, motd: &str) -> Self {
        Self {
            datagram: advertisement(port, motd),
            target: SocketAddrV4::new(MULTICAST_GROUP, DISCOVERY_PORT).into(),
            interval: ADVERTISE_INTERVAL,
        }
    }

    /// Sends to `target` instead of the multicast group
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Advertises until cancelled. A failed send stops the advertiser without failing.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("Failed to bind advertisement socket")?;
        if let Err(e) = socket.set_multicast_loop_v4(true) {
            log::debug!("Unable to enable multicast loopback: {e}");
        }
        log::info!(
            "Advertising {datagram:?} to {target}",
            datagram = self.datagram,
            target = self.target
        );

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = socket.send_to(self.datagram.as_bytes(), self.target).await {
                        log::warn!("Failed to send LAN advertisement, advertiser stopped: {e}");
                        break;
                    }
                    log::trace!("Advertisement sent");
                }
            }
        }

        log::debug!("Advertiser stopped");
        Ok(())
    }
}

/// Listens on `port` for `window` and returns the servers heard, by address
pub async fn discover(port: u16, window: Duration) -> Result<Vec<ServerInfo>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("Failed to bind discovery socket on port {port}"))?;
    // Unicast advertisements still arrive when the group cannot be joined
    if let Err(e) = socket.join_multicast_v4(MULTICAST_GROUP, Ipv4Addr::UNSPECIFIED) {
        log::warn!("Unable to join multicast group {MULTICAST_GROUP}: {e}");
    }

    let deadline = Instant::now() + window;
    let mut servers = BTreeMap::new();
    let mut datagram = [0u8; MAX_DATAGRAM_LENGTH];

    loop {
        let (len, sender) =
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut datagram)).await {
                Err(_) => break,
                Ok(received) => received.context("Failed to receive advertisement")?,
            };

        let Some((game_port, motd)) = std::str::from_utf8(&datagram[..len])
            .ok()
            .and_then(parse_advertisement)
        else {
            log::debug!("Ignoring malformed datagram from {sender}");
            continue;
        };

        let address = SocketAddr::new(sender.ip(), game_port);
        if servers.insert(address, motd.clone()).is_none() {
            log::info!("Found server {address}: {motd}");
        }
    }

    Ok(servers
        .into_iter()
        .map(|(address, motd)| ServerInfo { motd, address })
        .collect())
}
