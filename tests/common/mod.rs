#![allow(dead_code)]

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use checkers_server::{
    checkers::{Pos, Team},
    config::ServerConfig,
    events::{Event, EventData},
    network::{NetworkEventComponent, ReadOutcome},
    protocol::{PacketRoutes, Secret, names},
    server::{Server, messages::GameResult},
};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// Upper bound on any single wait in the tests
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration of an in-process server on a free loopback port
pub fn config() -> ServerConfig {
    ServerConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        advertise: false,
        seed: Some(11),
        ..ServerConfig::default()
    }
}

pub struct TestServer {
    pub address: SocketAddr,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<Option<GameResult>>>>,
}

impl TestServer {
    pub async fn new() -> Result<Self> {
        Self::with_config(config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Result<Self> {
        let server = Server::bind(config)
            .await
            .context("Failed to bind server")?;
        let address = server.local_addr()?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.run(cancel.clone()));
        Ok(Self {
            address,
            cancel,
            handle: Some(handle),
        })
    }

    pub async fn client(&self) -> Result<TestClient> {
        self.client_with(None).await
    }

    pub async fn client_with(&self, secret: Option<&Secret>) -> Result<TestClient> {
        let stream = TcpStream::connect(self.address)
            .await
            .context("Failed to connect to server")?;
        Ok(TestClient {
            events: NetworkEventComponent::new(stream, PacketRoutes::client()?, secret),
        })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the server to stop on its own
    pub async fn finish(mut self) -> Result<Option<GameResult>> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("Server already finished"))?;
        tokio::time::timeout(TIMEOUT, handle)
            .await
            .context("Server did not stop")?
            .context("Server task panicked")?
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct TestClient {
    events: NetworkEventComponent<TcpStream>,
}

impl TestClient {
    pub async fn send(&mut self, name: &str, data: EventData) -> Result<()> {
        self.events
            .write_event(&Event::new(name, data))
            .await
            .context("Failed to send event")
    }

    pub async fn click_piece(&mut self, pos: Pos) -> Result<()> {
        self.send(names::PIECE_CLICKED, EventData::Position(pos)).await
    }

    pub async fn click_tile(&mut self, pos: Pos) -> Result<()> {
        self.send(names::TILE_CLICKED, EventData::Position(pos)).await
    }

    /// Next event other than a heartbeat, `None` once the server closed the stream
    pub async fn try_recv(&mut self) -> Result<Option<Event>> {
        loop {
            match self.events.read_event(TIMEOUT).await? {
                ReadOutcome::Event(event) if event.name == names::NO_ACTIONS => continue,
                ReadOutcome::Event(event) => return Ok(Some(event)),
                ReadOutcome::Closed => return Ok(None),
                ReadOutcome::TimedOut => bail!("Timed out waiting for an event"),
            }
        }
    }

    pub async fn recv(&mut self) -> Result<Event> {
        self.try_recv()
            .await?
            .ok_or_else(|| anyhow!("Connection closed"))
    }

    /// Next raw outcome, heartbeats included
    pub async fn recv_raw(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        Ok(self.events.read_event(timeout).await?)
    }

    /// Skips events until one named `name`
    pub async fn recv_until(&mut self, name: &str) -> Result<Event> {
        loop {
            let event = self.recv().await?;
            if event.name == name {
                return Ok(event);
            }
        }
    }

    /// Reads the start of a game: the team and whether black moves first
    pub async fn start(&mut self) -> Result<(Team, bool)> {
        let team = match self.recv_until(names::PLAYING_AS).await?.data {
            EventData::Team(team) => team,
            other => bail!("Unexpected playing_as payload {other:?}"),
        };
        let turn = match self.recv_until(names::INITIAL_CONFIG).await?.data {
            EventData::InitialConfig { turn, .. } => turn,
            other => bail!("Unexpected initial_config payload {other:?}"),
        };
        Ok((team, turn))
    }

    /// Waits until the server closes the stream
    pub async fn closed(&mut self) -> Result<()> {
        while self.try_recv().await?.is_some() {}
        Ok(())
    }
}

/// Polls `check` until it holds
pub async fn eventually(mut check: impl FnMut() -> Result<bool>) -> Result<()> {
    tokio::time::timeout(TIMEOUT, async {
        while !check()? {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::Ok(())
    })
    .await
    .context("Condition not reached in time")?
}
