//! Authoritative game session.
//!
//! Owns the [`State`], the team of every connection, the current selections
//! and the interaction gate. Every operation returns the events to send, in
//! order; nothing here touches the network.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{Result, anyhow, bail};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tokio_util::sync::CancellationToken;

use crate::{
    checkers::{Action, ActionSet, ActionStep, Player, Pos, Rules, Size, State, StateError, Team},
    config::ServerConfig,
    events::{Bus, Component, Emitter, Event, EventData},
    protocol::names,
};

use super::messages::{GameResult, Outgoing, client_id};

/// Piece selected by a team, with its legal actions
#[derive(Debug, Clone)]
struct Selection {
    pos: Pos,
    actions: ActionSet,
}

#[derive(Debug)]
pub struct GameSession {
    size: Size,
    rules: Rules,
    internal: bool,
    start_threshold: usize,
    max_turns: Option<usize>,
    /// `None` until the game starts
    state: Option<State>,
    /// Connection id and team, in connection order
    clients: Vec<(u32, Team)>,
    selections: HashMap<Team, Selection>,
    /// Cleared for the duration of an animation block
    can_interact: bool,
    history: Vec<Action>,
    result: Option<GameResult>,
    rng: Xoshiro256PlusPlus,
}

impl GameSession {
    pub fn new(config: &ServerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_os_rng(),
        };
        Self {
            size: config.size,
            rules: config.rules,
            internal: config.internal,
            start_threshold: config.start_threshold(),
            max_turns: config.max_turns,
            state: None,
            clients: Vec::new(),
            selections: HashMap::new(),
            can_interact: false,
            history: Vec::new(),
            result: None,
            rng,
        }
    }

    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.state.is_some()
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn team(&self, id: u32) -> Option<Team> {
        self.clients
            .iter()
            .find(|(client, _)| *client == id)
            .map(|(_, team)| *team)
    }

    pub fn history(&self) -> &[Action] {
        &self.history
    }

    fn player_count(&self) -> usize {
        self.clients
            .iter()
            .filter(|(_, team)| *team != Team::Spectator)
            .count()
    }

    /// Team of a new connection: first free player slot, spectator otherwise
    fn free_team(&self) -> Team {
        if self.is_started() {
            return Team::Spectator;
        }
        if self.internal {
            return if self.player_count() == 0 {
                Team::Any
            } else {
                Team::Spectator
            };
        }
        Player::variants()
            .into_iter()
            .map(Team::from)
            .find(|team| !self.clients.iter().any(|(_, taken)| taken == team))
            .unwrap_or(Team::Spectator)
    }

    /// Registers a connection, starting the game once enough players joined
    pub fn connect(&mut self, id: u32) -> Vec<Outgoing> {
        let team = self.free_team();
        self.clients.push((id, team));
        log::info!(
            "[Client {id}] Playing as {team} ({n_players}/{threshold} players)",
            n_players = self.player_count(),
            threshold = self.start_threshold
        );

        if !self.is_started() && self.player_count() >= self.start_threshold {
            self.start()
        } else {
            Vec::new()
        }
    }

    /// Removes a connection. A player leaving a running game ends it.
    pub fn disconnect(&mut self, id: u32) {
        let Some(index) = self.clients.iter().position(|(client, _)| *client == id) else {
            return;
        };
        let (_, team) = self.clients.remove(index);
        self.selections.remove(&team);
        log::info!("[Client {id}] Disconnected ({team})");

        if self.is_started() && !self.is_finished() && team != Team::Spectator {
            log::warn!("Player {team} left the game");
            self.result = Some(GameResult {
                winner: None,
                total_turns: self.history.len(),
            });
        }
    }

    fn start(&mut self) -> Vec<Outgoing> {
        // Check who moves first
        let turn: bool = self.rng.random();
        let state = State::initial(self.size, Player::from_turn(turn), self.rules);
        log::info!(
            "Starting {size} game, {player} moves first",
            size = self.size,
            player = state.player()
        );

        let mut out: Vec<Outgoing> = state
            .pieces()
            .map(|(pos, piece)| Outgoing::all(names::CREATE_PIECE, EventData::Piece { pos, piece }))
            .collect();
        out.extend(
            self.clients
                .iter()
                .map(|(id, team)| Outgoing::to(*id, names::PLAYING_AS, EventData::Team(*team))),
        );
        out.push(Outgoing::all(
            names::INITIAL_CONFIG,
            EventData::InitialConfig {
                size: self.size,
                turn,
            },
        ));

        self.state = Some(state);
        self.can_interact = true;
        out
    }

    /// Team and player acting for connection `id`, if it may act right now
    fn acting(&self, id: u32) -> Option<(Team, Player, &State)> {
        let state = self.state.as_ref()?;
        if !self.can_interact || self.is_finished() {
            return None;
        }
        let team = self.team(id)?;
        let player = state.player();
        team.controls(player).then_some((team, player, state))
    }

    /// Selects, reselects or deselects a piece
    pub fn click_piece(&mut self, id: u32, pos: Pos) -> Vec<Outgoing> {
        // Check gate, ownership and available actions
        let Some((team, player, state)) = self.acting(id) else {
            log::debug!("[Client {id}] Piece click at {pos} rejected");
            return Vec::new();
        };
        if !state.can_player_select(player, pos) {
            log::debug!("[Client {id}] {pos} does not hold a {player} piece");
            return Vec::new();
        }
        let Some(actions) = state.legal_action_set(pos) else {
            log::debug!("[Client {id}] No legal action from {pos}");
            return Vec::new();
        };

        let mut out = Vec::new();
        let previous = self.selections.remove(&team);

        // Clicking the selected piece clears the selection
        if let Some(previous) = &previous {
            out.push(Outgoing::all(
                names::SELECT_PIECE,
                EventData::Selection {
                    pos: previous.pos,
                    selected: false,
                },
            ));
            if previous.pos == pos {
                out.extend(previous.actions.ends().iter().map(|end| {
                    Outgoing::all(names::DELETE_TILE, EventData::Position(*end))
                }));
                return out;
            }
            out.extend(
                previous
                    .actions
                    .ends()
                    .difference(actions.ends())
                    .map(|end| Outgoing::all(names::DELETE_TILE, EventData::Position(*end))),
            );
        }

        // Highlight ends not highlighted yet
        out.extend(
            actions
                .ends()
                .iter()
                .filter(|end| {
                    previous
                        .as_ref()
                        .is_none_or(|previous| !previous.actions.contains(**end))
                })
                .map(|end| Outgoing::all(names::CREATE_TILE, EventData::Position(*end))),
        );
        out.push(Outgoing::all(
            names::SELECT_PIECE,
            EventData::Selection {
                pos,
                selected: true,
            },
        ));

        log::debug!("[Client {id}] Selected {pos}");
        self.selections.insert(team, Selection { pos, actions });
        out
    }

    /// Plays the selected piece to `pos`, producing the animation block
    pub fn click_tile(&mut self, id: u32, pos: Pos) -> Result<Vec<Outgoing>, StateError> {
        // Check gate and selection
        let Some((team, _, _)) = self.acting(id) else {
            log::debug!("[Client {id}] Tile click at {pos} rejected");
            return Ok(Vec::new());
        };
        let Some(selection) = self
            .selections
            .get(&team)
            .filter(|selection| selection.actions.contains(pos))
            .cloned()
        else {
            log::debug!("[Client {id}] {pos} is not a highlighted tile");
            return Ok(Vec::new());
        };
        let Some(state) = self.state.take() else {
            return Ok(Vec::new());
        };

        let action = Action::new(selection.pos, pos);
        let mut steps = Vec::new();
        let next = match state.apply_with(action, &mut steps) {
            Ok(next) => next,
            Err(e) => {
                self.state = Some(state);
                return Err(e);
            }
        };

        // Animation block
        self.can_interact = false;
        self.selections.remove(&team);
        let mut out = vec![Outgoing::all(names::ANIMATION_STATE, EventData::Flag(true))];

        // Clear selection visuals
        out.push(Outgoing::all(
            names::SELECT_PIECE,
            EventData::Selection {
                pos: selection.pos,
                selected: false,
            },
        ));
        out.extend(
            selection
                .actions
                .ends()
                .iter()
                .map(|end| Outgoing::all(names::DELETE_TILE, EventData::Position(*end))),
        );

        out.extend(steps.into_iter().map(|step| match step {
            ActionStep::Moved { from, to } => {
                Outgoing::all(names::MOVE_PIECE_ANIMATION, EventData::Movement { from, to })
            }
            ActionStep::Jumped(pos) => {
                Outgoing::all(names::DELETE_PIECE_ANIMATION, EventData::Position(pos))
            }
            ActionStep::Kinged { pos, piece } => {
                Outgoing::all(names::UPDATE_PIECE_ANIMATION, EventData::Piece { pos, piece })
            }
        }));
        out.push(Outgoing::all(
            names::ACTION_COMPLETE,
            EventData::ActionComplete {
                from: action.from,
                to: action.to,
                turn: next.turn(),
            },
        ));

        self.history.push(action);
        let total_turns = self.history.len();
        log::info!("[Client {id}] Turn {total_turns}: {action}");
        log::debug!("\n{next}");

        if let Some(winner) = next.winner() {
            log::info!("Game finished, {winner} won after {total_turns} turns");
            out.push(Outgoing::all(names::GAME_OVER, EventData::Player(winner)));
            self.result = Some(GameResult {
                winner: Some(winner),
                total_turns,
            });
        } else if self.max_turns.is_some_and(|max| total_turns >= max) {
            log::warn!("Game reached maximum number of turns: {total_turns}");
            out.push(Outgoing::all(names::ANIMATION_STATE, EventData::Flag(false)));
            self.result = Some(GameResult {
                winner: None,
                total_turns,
            });
        } else {
            out.push(Outgoing::all(names::ANIMATION_STATE, EventData::Flag(false)));
            self.can_interact = true;
        }

        self.state = Some(next);
        Ok(out)
    }
}

/// Session shared by the handlers of the game component
pub type SharedSession = Arc<Mutex<GameSession>>;

pub fn lock_session(session: &SharedSession) -> Result<MutexGuard<'_, GameSession>> {
    session
        .lock()
        .map_err(|_| anyhow!("Game session lock poisoned"))
}

/// Connection a bubbled client event came from
fn origin_id(event: &Event) -> Result<u32> {
    event
        .origin
        .as_deref()
        .and_then(client_id)
        .ok_or_else(|| anyhow!("Event {} does not come from a client", event.name))
}

/// Raises session output: broadcasts on the root, the rest on the client sub-manager
fn deliver(bus: &Bus, out: Vec<Outgoing>) -> Result<()> {
    for Outgoing { target, event } in out {
        bus.raise(target.path(), event)?;
    }
    Ok(())
}

/// Ends the server once the session holds a result
fn finish_if_over(session: &GameSession, emitter: &Emitter) -> Result<()> {
    if session.is_finished() {
        emitter.emit(names::SHUTDOWN, EventData::Empty)?;
    }
    Ok(())
}

/// Component driving the session from connection and click events.
///
/// `started` is cancelled once the game starts.
pub fn game_component(session: SharedSession, bus: Bus, started: CancellationToken) -> Component {
    let on_connected = {
        let session = session.clone();
        let bus = bus.clone();
        move |event: Event, _: Emitter| {
            let session = session.clone();
            let bus = bus.clone();
            let started = started.clone();
            async move {
                let EventData::Client(id) = event.data else {
                    bail!("Unexpected payload for {}: {:?}", event.name, event.data);
                };
                let (out, is_started) = {
                    let mut session = lock_session(&session)?;
                    (session.connect(id), session.is_started())
                };
                if is_started {
                    started.cancel();
                }
                deliver(&bus, out)
            }
        }
    };

    let on_disconnected = {
        let session = session.clone();
        move |event: Event, emitter: Emitter| {
            let session = session.clone();
            async move {
                let EventData::Client(id) = event.data else {
                    bail!("Unexpected payload for {}: {:?}", event.name, event.data);
                };
                let mut session = lock_session(&session)?;
                let was_finished = session.is_finished();
                session.disconnect(id);
                if was_finished {
                    return Ok(());
                }
                finish_if_over(&session, &emitter)
            }
        }
    };

    let on_piece = {
        let session = session.clone();
        let bus = bus.clone();
        move |event: Event, _: Emitter| {
            let session = session.clone();
            let bus = bus.clone();
            async move {
                let id = origin_id(&event)?;
                let EventData::Position(pos) = event.data else {
                    bail!("Unexpected payload for {}: {:?}", event.name, event.data);
                };
                let out = lock_session(&session)?.click_piece(id, pos);
                deliver(&bus, out)
            }
        }
    };

    let on_tile = move |event: Event, emitter: Emitter| {
        let session = session.clone();
        let bus = bus.clone();
        async move {
            let id = origin_id(&event)?;
            let EventData::Position(pos) = event.data else {
                bail!("Unexpected payload for {}: {:?}", event.name, event.data);
            };
            let mut session = lock_session(&session)?;
            let out = session.click_tile(id, pos)?;
            deliver(&bus, out)?;
            finish_if_over(&session, &emitter)
        }
    };

    Component::new("game")
        .on(names::CLIENT_CONNECTED, on_connected)
        .on(names::CLIENT_DISCONNECTED, on_disconnected)
        .on(names::PIECE_CLICKED, on_piece)
        .on(names::TILE_CLICKED, on_tile)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::{checkers::PieceType, server::messages::Target};

    fn config() -> ServerConfig {
        ServerConfig {
            seed: Some(7),
            ..ServerConfig::default()
        }
    }

    /// Session with two players and black to move
    fn started() -> GameSession {
        let mut session = GameSession::new(&config());
        session.connect(0);
        session.connect(1);
        let state = session.state.take().unwrap();
        session.state = Some(state.with_player(Player::Black));
        session
    }

    fn events(out: &[Outgoing]) -> Vec<(&str, &EventData)> {
        out.iter()
            .map(|o| (o.event.name.as_str(), &o.event.data))
            .collect()
    }

    #[test]
    fn start_protocol() {
        let mut session = GameSession::new(&config());
        assert!(session.connect(0).is_empty());
        assert_eq!(session.team(0), Some(Team::Red));

        let out = session.connect(1);
        assert_eq!(session.team(1), Some(Team::Black));
        assert!(session.is_started());

        let creates = out
            .iter()
            .filter(|o| o.event.name == names::CREATE_PIECE)
            .count();
        assert_eq!(creates, 24);
        assert_eq!(
            out[24],
            Outgoing::to(0, names::PLAYING_AS, EventData::Team(Team::Red))
        );
        assert_eq!(
            out[25],
            Outgoing::to(1, names::PLAYING_AS, EventData::Team(Team::Black))
        );
        assert_matches!(
            &out[26],
            Outgoing { target: Target::All, event: Event { name, data: EventData::InitialConfig { size, .. }, .. } }
                if name == names::INITIAL_CONFIG && *size == Size::default()
        );
        assert_eq!(out.len(), 27);

        // Late joiners only watch
        assert!(session.connect(2).is_empty());
        assert_eq!(session.team(2), Some(Team::Spectator));
    }

    #[test]
    fn internal_session_starts_alone() {
        let mut session = GameSession::new(&ServerConfig {
            internal: true,
            ..config()
        });
        assert!(!session.connect(5).is_empty());
        assert_eq!(session.team(5), Some(Team::Any));
        assert!(session.is_started());
    }

    #[test]
    fn wrong_turn_click_is_silent() {
        let mut session = started();
        // Red player clicking on black's turn
        assert!(session.click_piece(0, Pos::new(1, 2)).is_empty());
        // Black player clicking a red piece
        assert!(session.click_piece(1, Pos::new(0, 5)).is_empty());
        // Black piece without any move
        assert!(session.click_piece(1, Pos::new(0, 1)).is_empty());
        // Tile without selection
        assert!(session.click_tile(1, Pos::new(0, 3)).unwrap().is_empty());
    }

    #[test]
    fn selection_highlights() {
        let mut session = started();
        let out = session.click_piece(1, Pos::new(1, 2));
        assert_eq!(
            events(&out),
            vec![
                (names::CREATE_TILE, &EventData::Position(Pos::new(0, 3))),
                (names::CREATE_TILE, &EventData::Position(Pos::new(2, 3))),
                (
                    names::SELECT_PIECE,
                    &EventData::Selection {
                        pos: Pos::new(1, 2),
                        selected: true
                    }
                ),
            ]
        );

        // Switching to a neighbour keeps the shared tile
        let out = session.click_piece(1, Pos::new(3, 2));
        assert_eq!(
            events(&out),
            vec![
                (
                    names::SELECT_PIECE,
                    &EventData::Selection {
                        pos: Pos::new(1, 2),
                        selected: false
                    }
                ),
                (names::DELETE_TILE, &EventData::Position(Pos::new(0, 3))),
                (names::CREATE_TILE, &EventData::Position(Pos::new(4, 3))),
                (
                    names::SELECT_PIECE,
                    &EventData::Selection {
                        pos: Pos::new(3, 2),
                        selected: true
                    }
                ),
            ]
        );

        // Clicking it again clears everything
        let out = session.click_piece(1, Pos::new(3, 2));
        assert_eq!(
            events(&out),
            vec![
                (
                    names::SELECT_PIECE,
                    &EventData::Selection {
                        pos: Pos::new(3, 2),
                        selected: false
                    }
                ),
                (names::DELETE_TILE, &EventData::Position(Pos::new(2, 3))),
                (names::DELETE_TILE, &EventData::Position(Pos::new(4, 3))),
            ]
        );
    }

    #[test]
    fn move_produces_animation_block() {
        let mut session = started();
        session.click_piece(1, Pos::new(1, 2));
        let out = session.click_tile(1, Pos::new(2, 3)).unwrap();
        let names: Vec<&str> = out.iter().map(|o| o.event.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                names::ANIMATION_STATE,
                names::SELECT_PIECE,
                names::DELETE_TILE,
                names::DELETE_TILE,
                names::MOVE_PIECE_ANIMATION,
                names::ACTION_COMPLETE,
                names::ANIMATION_STATE,
            ]
        );
        assert_eq!(out[0].event.data, EventData::Flag(true));
        assert_eq!(out[6].event.data, EventData::Flag(false));
        assert_eq!(
            out[5].event.data,
            EventData::ActionComplete {
                from: Pos::new(1, 2),
                to: Pos::new(2, 3),
                turn: false
            }
        );
        assert_eq!(session.history(), &[Action::new(Pos::new(1, 2), Pos::new(2, 3))]);

        // Now red's turn
        let state = session.state().unwrap();
        assert_eq!(state.player(), Player::Red);
        assert_eq!(state.piece(Pos::new(2, 3)), Some(PieceType::BlackPawn));
        assert!(session.click_piece(1, Pos::new(3, 2)).is_empty());
        assert!(!session.click_piece(0, Pos::new(0, 5)).is_empty());
    }

    #[test]
    fn winning_jump_ends_the_game() {
        let mut session = started();
        session.state = Some(
            State::new(
                Size::default(),
                [
                    (Pos::new(1, 2), PieceType::BlackPawn),
                    (Pos::new(2, 3), PieceType::RedPawn),
                ],
                Player::Black,
                Rules::default(),
            )
            .unwrap(),
        );
        session.click_piece(1, Pos::new(1, 2));
        let out = session.click_tile(1, Pos::new(3, 4)).unwrap();
        let tail: Vec<_> = events(&out).into_iter().rev().take(3).collect();
        assert_eq!(
            tail,
            vec![
                (names::GAME_OVER, &EventData::Player(Player::Black)),
                (
                    names::ACTION_COMPLETE,
                    &EventData::ActionComplete {
                        from: Pos::new(1, 2),
                        to: Pos::new(3, 4),
                        turn: false
                    }
                ),
                (names::DELETE_PIECE_ANIMATION, &EventData::Position(Pos::new(2, 3))),
            ]
        );
        assert_eq!(
            session.result(),
            Some(GameResult {
                winner: Some(Player::Black),
                total_turns: 1
            })
        );
        // Frozen from now on
        assert!(session.click_piece(0, Pos::new(3, 4)).is_empty());
    }

    #[test]
    fn max_turns_stops_without_winner() {
        let mut session = GameSession::new(&ServerConfig {
            max_turns: Some(1),
            ..config()
        });
        session.connect(0);
        session.connect(1);
        let state = session.state().unwrap().clone();
        let player = state.player();
        let action = state.legal_actions(player)[0];
        let id = if player == Player::Red { 0 } else { 1 };
        session.click_piece(id, action.from);
        session.click_tile(id, action.to).unwrap();
        assert_eq!(
            session.result(),
            Some(GameResult {
                winner: None,
                total_turns: 1
            })
        );
    }

    #[test]
    fn player_leaving_ends_the_game() {
        let mut session = started();
        session.connect(2);
        session.disconnect(2);
        assert!(!session.is_finished());
        session.disconnect(0);
        assert_eq!(session.result().map(|r| r.winner), Some(None));
    }
}
