//! # Game client
//!
//! Mirrors the server state from the event stream and forwards clicks.
//!
//! ## Component tree
//! The root manager `client` holds:
//! - `network`: writes `piece_clicked`/`tile_clicked` requests to the server.
//! - `game`: applies server events to the [`ClientState`] and raises
//!   `turn_started` whenever the local team has to act.
//! - any extra component given to [`GameClient::connect_with`], such as a
//!   machine player.
//!
//! The replica is never changed by local clicks, only by server events.

use std::{
    collections::BTreeSet,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{Context, Result, anyhow, bail};
use tokio::{
    io::{ReadHalf, WriteHalf},
    net::TcpStream,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

use crate::{
    checkers::{Action, PieceType, Player, Pos, Rules, State, Team},
    config::{CONNECTION_QUEUE_CAPACITY, ClientConfig},
    events::{Bus, Component, ComponentManager, Dispatcher, Emitter, Event, EventData, TaskGroup},
    network::{EventReader, EventWriter, NetworkEventComponent, ReadOutcome},
    protocol::{NetworkError, PacketRoutes, SERVER_PACKETS, names},
};

pub mod animation;

pub use animation::{Animation, AnimationQueue};

/// Local view of a hosted game
#[derive(Debug)]
pub struct ClientState {
    rules: Rules,
    /// `None` until `initial_config`
    replica: Option<State>,
    /// Pieces announced before `initial_config`
    pending: Vec<(Pos, PieceType)>,
    team: Option<Team>,
    selected: Option<Pos>,
    tiles: BTreeSet<Pos>,
    animations: AnimationQueue,
    /// Inside an animation block
    animating: bool,
    winner: Option<Player>,
    game_over: bool,
}

impl ClientState {
    pub fn new(rules: Rules) -> Self {
        Self {
            rules,
            replica: None,
            pending: Vec::new(),
            team: None,
            selected: None,
            tiles: BTreeSet::new(),
            animations: AnimationQueue::new(),
            animating: false,
            winner: None,
            game_over: false,
        }
    }

    pub fn state(&self) -> Option<&State> {
        self.replica.as_ref()
    }

    pub fn team(&self) -> Option<Team> {
        self.team
    }

    pub fn selected(&self) -> Option<Pos> {
        self.selected
    }

    /// Highlighted action ends of the selected piece
    pub fn tiles(&self) -> &BTreeSet<Pos> {
        &self.tiles
    }

    pub fn winner(&self) -> Option<Player> {
        self.winner
    }

    pub fn is_over(&self) -> bool {
        self.game_over
    }

    pub fn next_animation(&mut self) -> Option<Animation> {
        self.animations.pop()
    }

    /// True when the local team controls the player to move
    pub fn is_own_turn(&self) -> bool {
        match (&self.replica, self.team) {
            (Some(state), Some(team)) => team.controls(state.player()),
            _ => false,
        }
    }

    /// Clicks may be sent: game running, no animation block open, own turn
    pub fn can_interact(&self) -> bool {
        !self.game_over && !self.animating && self.is_own_turn()
    }

    /// Applies a server event. Returns true when it starts a turn of the local team.
    pub fn handle(&mut self, event: &Event) -> Result<bool> {
        match (event.name.as_str(), &event.data) {
            (names::NO_ACTIONS, EventData::Empty) => {}

            (names::CREATE_PIECE, EventData::Piece { pos, piece }) => {
                if self.replica.is_some() {
                    log::warn!("Ignoring piece created at {pos} after game start");
                } else {
                    self.pending.push((*pos, *piece));
                }
            }

            (names::SELECT_PIECE, EventData::Selection { pos, selected }) => {
                if *selected {
                    self.selected = Some(*pos);
                } else if self.selected == Some(*pos) {
                    self.selected = None;
                }
            }
            (names::CREATE_TILE, EventData::Position(pos)) => {
                self.tiles.insert(*pos);
            }
            (names::DELETE_TILE, EventData::Position(pos)) => {
                self.tiles.remove(pos);
            }

            (names::MOVE_PIECE_ANIMATION, EventData::Movement { from, to }) => {
                self.animations.push(Animation::Move {
                    from: *from,
                    to: *to,
                });
            }
            (names::DELETE_PIECE_ANIMATION, EventData::Position(pos)) => {
                self.animations.push(Animation::Delete(*pos));
            }
            (names::UPDATE_PIECE_ANIMATION, EventData::Piece { pos, piece }) => {
                self.animations.push(Animation::Update {
                    pos: *pos,
                    piece: *piece,
                });
            }
            (names::ANIMATION_STATE, EventData::Flag(animating)) => {
                self.animating = *animating;
                self.animations.push(Animation::State(*animating));
            }

            (names::GAME_OVER, EventData::Player(winner)) => {
                log::info!("Game over, {winner} won");
                self.winner = Some(*winner);
                self.game_over = true;
                self.animating = false;
                self.animations.push(Animation::GameOver(*winner));
            }

            (names::ACTION_COMPLETE, EventData::ActionComplete { from, to, turn }) => {
                let state = self
                    .replica
                    .as_ref()
                    .ok_or_else(|| anyhow!("Action completed before the game started"))?;
                let action = Action::new(*from, *to);
                let next = state
                    .apply(action)
                    .with_context(|| format!("Replica cannot replay {action}"))?;
                if next.turn() != *turn {
                    bail!("Replica out of sync after {action}: turn {} expected", turn);
                }
                log::debug!("Replayed {action}");
                self.replica = Some(next);
                return Ok(self.is_own_turn());
            }

            (names::INITIAL_CONFIG, EventData::InitialConfig { size, turn }) => {
                let state = State::new(
                    *size,
                    self.pending.drain(..),
                    Player::from_turn(*turn),
                    self.rules,
                )
                .context("Invalid initial setup")?;
                log::info!("Game started on a {size} board, {} to move", state.player());
                self.replica = Some(state);
                return Ok(self.is_own_turn());
            }

            (names::PLAYING_AS, EventData::Team(team)) => {
                log::info!("Playing as {team}");
                self.team = Some(*team);
            }

            (name, data) => bail!("Unexpected server event {name}: {data:?}"),
        }
        Ok(false)
    }
}

pub type SharedClientState = Arc<Mutex<ClientState>>;

pub fn lock_state(state: &SharedClientState) -> Result<MutexGuard<'_, ClientState>> {
    state
        .lock()
        .map_err(|_| anyhow!("Client state lock poisoned"))
}

/// Forwards click requests to the writer task
fn network_component(tx: mpsc::Sender<Event>) -> Component {
    [names::PIECE_CLICKED, names::TILE_CLICKED]
        .into_iter()
        .fold(Component::new("network"), |component, name| {
            let tx = tx.clone();
            component.on(name, move |event: Event, _| {
                let tx = tx.clone();
                async move {
                    tx.send(event)
                        .await
                        .map_err(|e| anyhow!("Writer closed, dropped {}", e.0.name))
                }
            })
        })
}

/// Applies server events to the shared state
fn game_component(state: SharedClientState, closed: CancellationToken) -> Component {
    let component = SERVER_PACKETS
        .iter()
        .fold(Component::new("game"), |component, (name, _, _)| {
            let state = state.clone();
            component.on(*name, move |event: Event, emitter: Emitter| {
                let state = state.clone();
                async move {
                    let turn_started = lock_state(&state)?.handle(&event)?;
                    if turn_started {
                        emitter.emit(names::TURN_STARTED, EventData::Empty)?;
                    }
                    anyhow::Ok(())
                }
            })
        });

    component.on(names::CLIENT_DISCONNECTED, move |_, _| {
        let closed = closed.clone();
        async move {
            log::info!("Disconnected from server");
            closed.cancel();
            Ok(())
        }
    })
}

async fn read_loop(
    mut reader: EventReader<ReadHalf<TcpStream>>,
    bus: Bus,
    config: ClientConfig,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = reader.read_event(config.read_timeout) => outcome,
        };
        match outcome {
            Ok(ReadOutcome::Event(event)) => {
                log::trace!("Received {}: {:?}", event.name, event.data);
                bus.raise(Vec::new(), event)?;
            }
            Ok(ReadOutcome::TimedOut) => log::trace!("No activity from server"),
            Ok(ReadOutcome::Closed) => {
                log::debug!("Server closed the connection");
                break;
            }
            Err(NetworkError::Io(e)) => {
                log::warn!("Failed to read from server: {e}");
                break;
            }
            Err(e) => log::warn!("Dropping malformed server packet: {e}"),
        }
    }

    if let Err(e) = bus.raise(
        Vec::new(),
        Event::new(names::CLIENT_DISCONNECTED, EventData::Empty),
    ) {
        log::debug!("Unable to report disconnection: {e}");
    }
    Ok(())
}

async fn write_loop(
    mut writer: EventWriter<WriteHalf<TcpStream>>,
    mut rx: mpsc::Receiver<Event>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        log::debug!("Sending {}: {:?}", event.name, event.data);
        if let Err(e) = writer.write_event(&event).await {
            log::warn!("Failed to send {}: {e}", event.name);
            break;
        }
    }

    // Graceful close: EOF first
    if let Err(e) = writer.close().await {
        log::debug!("Failed to close connection: {e}");
    }
    Ok(())
}

/// Connected game client
#[derive(Debug)]
pub struct GameClient {
    state: SharedClientState,
    bus: Bus,
    tasks: TaskGroup,
    /// Cancelled once the connection is gone
    closed: CancellationToken,
}

impl GameClient {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        Self::connect_with(config, |_| Vec::new()).await
    }

    /// Connects with extra root components built from the shared state
    pub async fn connect_with<F>(config: &ClientConfig, components: F) -> Result<Self>
    where
        F: FnOnce(&SharedClientState) -> Vec<Component>,
    {
        let stream = TcpStream::connect(config.server)
            .await
            .with_context(|| format!("Failed to connect to {}", config.server))?;
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Unable to disable Nagle: {e}");
        }
        log::info!("Connected to {}", config.server);

        let (reader, writer) =
            NetworkEventComponent::new(stream, PacketRoutes::client()?, config.secret.as_ref())
                .into_split();

        let state: SharedClientState = Arc::new(Mutex::new(ClientState::new(config.rules)));
        let closed = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(CONNECTION_QUEUE_CAPACITY);

        let mut root = ComponentManager::new("client");
        root.add_component(network_component(outbound_tx))?;
        root.add_component(game_component(state.clone(), closed.clone()))?;
        for component in components(&state) {
            root.add_component(component)?;
        }
        let (dispatcher, bus) = Dispatcher::new(root);

        let mut tasks = TaskGroup::new();
        let token = tasks.token();
        spawn_guarded(&mut tasks, &closed, dispatcher.run(token.clone()));
        spawn_guarded(
            &mut tasks,
            &closed,
            read_loop(reader, bus.clone(), config.clone(), token.clone()),
        );
        spawn_guarded(&mut tasks, &closed, write_loop(writer, outbound_rx, token));

        Ok(Self {
            state,
            bus,
            tasks,
            closed,
        })
    }

    pub fn state(&self) -> &SharedClientState {
        &self.state
    }

    /// Sends the request matching a click on `pos`: a tile request on a
    /// highlighted cell, a piece request otherwise
    pub fn handle_click(&self, pos: Pos) -> Result<()> {
        let name = {
            let state = lock_state(&self.state)?;
            if !state.can_interact() {
                log::debug!("Click on {pos} ignored");
                return Ok(());
            }
            if state.tiles().contains(&pos) {
                names::TILE_CLICKED
            } else {
                names::PIECE_CLICKED
            }
        };
        self.bus
            .raise(Vec::new(), Event::new(name, EventData::Position(pos)))?;
        Ok(())
    }

    pub fn next_animation(&self) -> Result<Option<Animation>> {
        Ok(lock_state(&self.state)?.next_animation())
    }

    pub fn can_interact(&self) -> Result<bool> {
        Ok(lock_state(&self.state)?.can_interact())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Waits for the server to close the connection, then shuts down
    pub async fn wait_closed(self) -> Result<()> {
        self.closed.cancelled().await;
        self.disconnect().await
    }

    /// Closes the connection and waits for every task
    pub async fn disconnect(self) -> Result<()> {
        self.tasks.cancel();
        self.tasks.join().await
    }
}

/// Spawns `task`, marking the client closed if it fails
fn spawn_guarded<F>(tasks: &mut TaskGroup, closed: &CancellationToken, task: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let closed = closed.clone();
    tasks.spawn(async move {
        let result = task.await;
        if result.is_err() {
            closed.cancel();
        }
        result
    });
}
