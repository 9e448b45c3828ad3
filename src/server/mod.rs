//! Authoritative checkers server.
//!
//! One dispatcher task owns the component tree: the `game` and `lifecycle`
//! components on the root manager, plus one `client_<id>` sub-manager per
//! connection holding its outbound `network` component. Each accepted socket
//! is served by a [`Connection`] task.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{CONNECTION_QUEUE_CAPACITY, ServerConfig},
    events::{Component, ComponentManager, Dispatcher, Event, EventData, TaskGroup},
    network::{NetworkEventComponent, lan::Advertiser},
    protocol::{PacketRoutes, names},
};

pub mod connection;
pub mod game;
pub mod messages;

use connection::{Connection, outbound_component};
use game::{GameSession, SharedSession, game_component, lock_session};
use messages::{GameResult, client_name};

/// Cancels `finished` when the session asks for shutdown
fn lifecycle_component(finished: CancellationToken) -> Component {
    Component::new("lifecycle").on(names::SHUTDOWN, move |_, _| {
        let finished = finished.clone();
        async move {
            log::debug!("Shutdown requested");
            finished.cancel();
            Ok(())
        }
    })
}

#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
}

impl Server {
    /// Binds the game port
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let address = config.address();
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind server to {address}"))?;
        Ok(Self { config, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Unable to get server address")
    }

    /// Hosts one game.
    ///
    /// Returns the outcome, or `None` when `cancel` fired before the game finished.
    pub async fn run(self, cancel: CancellationToken) -> Result<Option<GameResult>> {
        let address = self.local_addr()?;
        let Server { config, listener } = self;
        log::info!(
            "Listening on {address} for {threshold} player(s), board {size}",
            threshold = config.start_threshold(),
            size = config.size
        );

        let scope = cancel.child_token();
        let accepting = scope.child_token();
        let finished = scope.child_token();
        let session: SharedSession = Arc::new(Mutex::new(GameSession::new(&config)));

        // Event dispatcher
        let (dispatcher, bus) = Dispatcher::new(ComponentManager::new("server"));
        let mut tasks = TaskGroup::with_parent(&scope);
        {
            let token = tasks.token();
            let scope = scope.clone();
            tasks.spawn(async move {
                let result = dispatcher.run(token).await;
                if result.is_err() {
                    scope.cancel();
                }
                result
            });
        }
        bus.add_component(
            Vec::new(),
            game_component(session.clone(), bus.clone(), accepting.clone()),
        )
        .await
        .context("Failed to register game component")?;
        bus.add_component(Vec::new(), lifecycle_component(finished.clone()))
            .await
            .context("Failed to register lifecycle component")?;

        if config.advertise {
            tasks.spawn(Advertiser::new(address.port(), &config.motd).run(accepting.clone()));
        }

        // Accept loop
        let mut connections = TaskGroup::with_parent(&scope);
        let mut next_id: u32 = 0;
        loop {
            let (stream, peer) = tokio::select! {
                _ = accepting.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        log::warn!("Failed to accept connection: {e}");
                        continue;
                    }
                },
            };

            // Check client limit
            let n_clients = lock_session(&session)?.client_count();
            if n_clients >= config.max_clients {
                log::warn!("Refusing {peer}: {n_clients}/{} clients", config.max_clients);
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                log::debug!("Unable to disable Nagle on {peer}: {e}");
            }

            let id = next_id;
            next_id += 1;
            log::info!("[Client {id}] Connected from {peer}");

            let (outbound_tx, outbound_rx) = mpsc::channel(CONNECTION_QUEUE_CAPACITY);
            let mut manager = ComponentManager::new(client_name(id));
            manager.add_component(outbound_component(id, outbound_tx))?;
            bus.add_manager(Vec::new(), manager)
                .await
                .with_context(|| format!("Failed to register client {id}"))?;
            bus.raise(
                Vec::new(),
                Event::new(names::CLIENT_CONNECTED, EventData::Client(id)),
            )?;

            let events = NetworkEventComponent::new(
                stream,
                PacketRoutes::server()?,
                config.secret.as_ref(),
            );
            let connection = Connection::new(
                id,
                events,
                outbound_rx,
                bus.clone(),
                config.heartbeat_interval,
                config.read_timeout,
            );
            connections.spawn(connection.run(connections.token()));
        }

        drop(listener);
        log::info!("No longer accepting connections");

        finished.cancelled().await;

        log::info!("Disconnecting all clients");
        connections.cancel();
        let connections_result = connections.join().await;
        tasks.cancel();
        let tasks_result = tasks.join().await;
        connections_result.context("Connection task failed")?;
        tasks_result.context("Server task failed")?;

        let result = lock_session(&session)?.result();
        match result {
            Some(result) => log::info!("Game over: {result}"),
            None => log::warn!("Server stopped before the game finished"),
        }
        Ok(result)
    }
}
