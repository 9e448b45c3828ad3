use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    events::{Bus, Component, Event, EventData},
    network::{NetworkEventComponent, ReadOutcome},
    protocol::{NetworkError, SERVER_PACKETS, names},
};

use super::messages::client_name;

/// Component forwarding every server packet event to the outbound queue of a connection
pub fn outbound_component(id: u32, tx: mpsc::Sender<Event>) -> Component {
    SERVER_PACKETS
        .iter()
        .fold(Component::new("network"), |component, (name, _, _)| {
            let tx = tx.clone();
            component.on(*name, move |event: Event, _| {
                let tx = tx.clone();
                async move {
                    if let Err(e) = tx.send(event).await {
                        log::debug!("[Client {id}] Outbound queue closed, dropped {}", e.0.name);
                    }
                    Ok(())
                }
            })
        })
}

/// Task serving one accepted client
#[derive(Debug)]
pub struct Connection {
    id: u32,
    events: NetworkEventComponent<TcpStream>,
    /// Events queued by the outbound component
    outbound_rx: mpsc::Receiver<Event>,
    bus: Bus,
    heartbeat: Duration,
    read_timeout: Duration,
}

impl Connection {
    pub fn new(
        id: u32,
        events: NetworkEventComponent<TcpStream>,
        outbound_rx: mpsc::Receiver<Event>,
        bus: Bus,
        heartbeat: Duration,
        read_timeout: Duration,
    ) -> Self {
        log::debug!("[Client {id}] Creating connection");
        Self {
            id,
            events,
            outbound_rx,
            bus,
            heartbeat,
            read_timeout,
        }
    }

    /// Connection main loop, until the peer leaves or `cancel` fires.
    ///
    /// Queued events still get written on cancellation.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Connection {
            id,
            events,
            mut outbound_rx,
            bus,
            heartbeat,
            read_timeout,
        } = self;
        log::trace!("[Client {id}] Task spawned");

        let (mut reader, mut writer) = events.into_split();
        let mut idle = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
        idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("[Client {id}] Cancelled, flushing outbound queue");
                    while let Ok(event) = outbound_rx.try_recv() {
                        if let Err(e) = writer.write_event(&event).await {
                            log::warn!("[Client {id}] Failed to flush {}: {e}", event.name);
                            break;
                        }
                    }
                    break;
                }

                // Event for the remote client
                event = outbound_rx.recv() => {
                    let Some(event) = event else { break };
                    log::trace!("[Client {id}] Sending {}", event.name);
                    if let Err(e) = writer.write_event(&event).await {
                        log::warn!("[Client {id}] Failed to send {}: {e}", event.name);
                        break;
                    }
                    idle.reset();
                }

                // Idle heartbeat
                _ = idle.tick() => {
                    if let Err(e) = writer.write_event(&Event::new(names::NO_ACTIONS, EventData::Empty)).await {
                        log::warn!("[Client {id}] Failed to send heartbeat: {e}");
                        break;
                    }
                }

                // Request from the remote client
                outcome = reader.read_event(read_timeout) => {
                    match outcome {
                        Ok(ReadOutcome::Event(event)) => {
                            log::debug!("[Client {id}] Received {}: {:?}", event.name, event.data);
                            bus.raise(vec![client_name(id)], event.with_level(1))
                                .with_context(|| format!("Unable to forward request of client {id}"))?;
                        }
                        Ok(ReadOutcome::TimedOut) => {
                            log::trace!("[Client {id}] No request in {read_timeout:?}");
                        }
                        Ok(ReadOutcome::Closed) => {
                            log::info!("[Client {id}] Remote client disconnected");
                            break;
                        }
                        Err(NetworkError::Io(e)) => {
                            log::warn!("[Client {id}] Failed to read from stream: {e}");
                            break;
                        }
                        Err(e) => {
                            log::warn!("[Client {id}] Dropping malformed request: {e}");
                        }
                    }
                }
            }
        }

        // Pending sends fail from now on instead of waiting on a full queue
        drop(outbound_rx);
        if let Err(e) = writer.close().await {
            log::debug!("[Client {id}] Failed to close stream: {e}");
        }

        // The dispatcher may already be gone during shutdown
        if let Err(e) = bus.remove(Vec::new(), client_name(id)).await {
            log::debug!("[Client {id}] Unable to remove client manager: {e}");
        }
        if let Err(e) = bus.raise(
            Vec::new(),
            Event::new(names::CLIENT_DISCONNECTED, EventData::Client(id)),
        ) {
            log::debug!("[Client {id}] Unable to report disconnection: {e}");
        }

        Ok(())
    }
}
