//! # Protocol Module
//!
//! Wire protocol shared by the game server and its clients: event names,
//! packet identifiers, payload layouts and the routing tables mapping one
//! to the other.
//!
//! ## Packets
//! Server to client: `no_actions`, `create_piece`, `select_piece`,
//! `create_tile`, `delete_tile`, `delete_piece_animation`,
//! `update_piece_animation`, `move_piece_animation`, `animation_state`,
//! `game_over`, `action_complete`, `initial_config`, `playing_as`.
//!
//! Client to server: `piece_clicked` and `tile_clicked`, the requests to
//! select a piece or the destination tile of the selected piece.

use std::{collections::HashMap, io};

use thiserror::Error;

use crate::events::{Event, EventData};

pub mod buffer;
pub mod codec;
pub mod crypto;

pub use buffer::{Buffer, BufferError};
pub use codec::{MAX_PAYLOAD_LENGTH, Packet, PacketCodec};
pub use crypto::Secret;

/// Event names
pub mod names {
    // Server to client
    pub const NO_ACTIONS: &str = "no_actions";
    pub const CREATE_PIECE: &str = "create_piece";
    pub const SELECT_PIECE: &str = "select_piece";
    pub const CREATE_TILE: &str = "create_tile";
    pub const DELETE_TILE: &str = "delete_tile";
    pub const DELETE_PIECE_ANIMATION: &str = "delete_piece_animation";
    pub const UPDATE_PIECE_ANIMATION: &str = "update_piece_animation";
    pub const MOVE_PIECE_ANIMATION: &str = "move_piece_animation";
    pub const ANIMATION_STATE: &str = "animation_state";
    pub const GAME_OVER: &str = "game_over";
    pub const ACTION_COMPLETE: &str = "action_complete";
    pub const INITIAL_CONFIG: &str = "initial_config";
    pub const PLAYING_AS: &str = "playing_as";

    // Client to server
    pub const PIECE_CLICKED: &str = "piece_clicked";
    pub const TILE_CLICKED: &str = "tile_clicked";

    // Local to a process
    pub const CLIENT_CONNECTED: &str = "client_connected";
    pub const CLIENT_DISCONNECTED: &str = "client_disconnected";
    pub const TURN_STARTED: &str = "turn_started";
    pub const SHUTDOWN: &str = "shutdown";
}

/// Errors of the framed network layer
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed payload: {0}")]
    Buffer(#[from] BufferError),
    #[error("no route for inbound packet {0}")]
    UnhandledPacket(u32),
    #[error("no route for outbound event {0}")]
    UnhandledEvent(String),
    #[error("payload of {name} does not match {expected:?}")]
    PayloadMismatch { name: String, expected: PayloadKind },
    #[error("route {0} is already registered")]
    DuplicateRoute(String),
    #[error("event {0} would be routed back onto itself")]
    SelfLoop(String),
    #[error("payload of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
}

/// Payload layout of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// No bytes
    Empty,
    /// `pos`
    Position,
    /// `pos · type`
    Piece,
    /// `pos · bool`
    Selection,
    /// `from · to`
    Movement,
    /// `bool`
    Flag,
    /// `player`
    Player,
    /// `team`
    Team,
    /// `from · to · turn`
    ActionComplete,
    /// `size · turn`
    InitialConfig,
}

impl PayloadKind {
    /// Encodes `data` into `buffer`, failing when it has another layout
    pub fn encode(&self, data: &EventData, buffer: &mut Buffer) -> Option<()> {
        match (self, data) {
            (PayloadKind::Empty, EventData::Empty) => {}
            (PayloadKind::Position, EventData::Position(pos)) => buffer.write_pos(*pos),
            (PayloadKind::Piece, EventData::Piece { pos, piece }) => {
                buffer.write_pos(*pos);
                buffer.write_piece(*piece);
            }
            (PayloadKind::Selection, EventData::Selection { pos, selected }) => {
                buffer.write_pos(*pos);
                buffer.write_bool(*selected);
            }
            (PayloadKind::Movement, EventData::Movement { from, to }) => {
                buffer.write_pos(*from);
                buffer.write_pos(*to);
            }
            (PayloadKind::Flag, EventData::Flag(flag)) => buffer.write_bool(*flag),
            (PayloadKind::Player, EventData::Player(player)) => buffer.write_player(*player),
            (PayloadKind::Team, EventData::Team(team)) => buffer.write_team(*team),
            (PayloadKind::ActionComplete, EventData::ActionComplete { from, to, turn }) => {
                buffer.write_pos(*from);
                buffer.write_pos(*to);
                buffer.write_bool(*turn);
            }
            (PayloadKind::InitialConfig, EventData::InitialConfig { size, turn }) => {
                buffer.write_size(*size);
                buffer.write_bool(*turn);
            }
            _ => return None,
        }
        Some(())
    }

    pub fn decode(&self, buffer: &mut Buffer) -> Result<EventData, BufferError> {
        let data = match self {
            PayloadKind::Empty => EventData::Empty,
            PayloadKind::Position => EventData::Position(buffer.read_pos()?),
            PayloadKind::Piece => EventData::Piece {
                pos: buffer.read_pos()?,
                piece: buffer.read_piece()?,
            },
            PayloadKind::Selection => EventData::Selection {
                pos: buffer.read_pos()?,
                selected: buffer.read_bool()?,
            },
            PayloadKind::Movement => EventData::Movement {
                from: buffer.read_pos()?,
                to: buffer.read_pos()?,
            },
            PayloadKind::Flag => EventData::Flag(buffer.read_bool()?),
            PayloadKind::Player => EventData::Player(buffer.read_player()?),
            PayloadKind::Team => EventData::Team(buffer.read_team()?),
            PayloadKind::ActionComplete => EventData::ActionComplete {
                from: buffer.read_pos()?,
                to: buffer.read_pos()?,
                turn: buffer.read_bool()?,
            },
            PayloadKind::InitialConfig => EventData::InitialConfig {
                size: buffer.read_size()?,
                turn: buffer.read_bool()?,
            },
        };
        Ok(data)
    }
}

/// Server to client routes: name, packet id, payload
pub const SERVER_PACKETS: [(&str, u32, PayloadKind); 13] = [
    (names::NO_ACTIONS, 0, PayloadKind::Empty),
    (names::CREATE_PIECE, 1, PayloadKind::Piece),
    (names::SELECT_PIECE, 2, PayloadKind::Selection),
    (names::CREATE_TILE, 3, PayloadKind::Position),
    (names::DELETE_TILE, 4, PayloadKind::Position),
    (names::DELETE_PIECE_ANIMATION, 5, PayloadKind::Position),
    (names::UPDATE_PIECE_ANIMATION, 6, PayloadKind::Piece),
    (names::MOVE_PIECE_ANIMATION, 7, PayloadKind::Movement),
    (names::ANIMATION_STATE, 8, PayloadKind::Flag),
    (names::GAME_OVER, 9, PayloadKind::Player),
    (names::ACTION_COMPLETE, 10, PayloadKind::ActionComplete),
    (names::INITIAL_CONFIG, 11, PayloadKind::InitialConfig),
    (names::PLAYING_AS, 12, PayloadKind::Team),
];

/// Client to server routes: name, packet id, payload
pub const CLIENT_PACKETS: [(&str, u32, PayloadKind); 2] = [
    (names::PIECE_CLICKED, 0, PayloadKind::Position),
    (names::TILE_CLICKED, 1, PayloadKind::Position),
];

/// Bijective mappings between event names and packet ids, one per direction
#[derive(Debug, Clone, Default)]
pub struct PacketRoutes {
    outbound: HashMap<String, (u32, PayloadKind)>,
    inbound: HashMap<u32, (String, PayloadKind)>,
}

impl PacketRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes used by the server end of a connection
    pub fn server() -> Result<Self, NetworkError> {
        Self::from_tables(&SERVER_PACKETS, &CLIENT_PACKETS)
    }

    /// Routes used by the client end of a connection
    pub fn client() -> Result<Self, NetworkError> {
        Self::from_tables(&CLIENT_PACKETS, &SERVER_PACKETS)
    }

    pub fn from_tables(
        outbound: &[(&str, u32, PayloadKind)],
        inbound: &[(&str, u32, PayloadKind)],
    ) -> Result<Self, NetworkError> {
        let mut routes = Self::new();
        for &(name, id, kind) in outbound {
            routes.register_outbound(name, id, kind)?;
        }
        for &(name, id, kind) in inbound {
            routes.register_inbound(name, id, kind)?;
        }
        Ok(routes)
    }

    fn check_loop(&self, name: &str, id: u32, outbound: bool) -> Result<(), NetworkError> {
        let looped = if outbound {
            self.inbound
                .get(&id)
                .is_some_and(|(inbound, _)| inbound == name)
        } else {
            self.outbound
                .get(name)
                .is_some_and(|(outbound, _)| *outbound == id)
        };
        if looped {
            return Err(NetworkError::SelfLoop(name.to_string()));
        }
        Ok(())
    }

    pub fn register_outbound(
        &mut self,
        name: &str,
        id: u32,
        kind: PayloadKind,
    ) -> Result<(), NetworkError> {
        self.check_loop(name, id, true)?;
        if self.outbound.contains_key(name) || self.outbound.values().any(|(used, _)| *used == id)
        {
            return Err(NetworkError::DuplicateRoute(name.to_string()));
        }
        self.outbound.insert(name.to_string(), (id, kind));
        Ok(())
    }

    pub fn register_inbound(
        &mut self,
        name: &str,
        id: u32,
        kind: PayloadKind,
    ) -> Result<(), NetworkError> {
        self.check_loop(name, id, false)?;
        if self.inbound.contains_key(&id) || self.inbound.values().any(|(used, _)| used == name) {
            return Err(NetworkError::DuplicateRoute(name.to_string()));
        }
        self.inbound.insert(id, (name.to_string(), kind));
        Ok(())
    }

    /// Whether `name` is sent over the wire
    pub fn is_outbound(&self, name: &str) -> bool {
        self.outbound.contains_key(name)
    }

    /// Outbound event names
    pub fn outbound_names(&self) -> impl Iterator<Item = &str> {
        self.outbound.keys().map(String::as_str)
    }

    /// Encodes an outbound event into a packet
    pub fn encode(&self, event: &Event) -> Result<Packet, NetworkError> {
        let &(id, kind) = self
            .outbound
            .get(&event.name)
            .ok_or_else(|| NetworkError::UnhandledEvent(event.name.clone()))?;

        let mut buffer = Buffer::new();
        kind.encode(&event.data, &mut buffer)
            .ok_or_else(|| NetworkError::PayloadMismatch {
                name: event.name.clone(),
                expected: kind,
            })?;

        Ok(Packet::new(id, buffer.into_inner().freeze()))
    }

    /// Decodes an inbound packet into an event
    pub fn decode(&self, packet: &Packet) -> Result<Event, NetworkError> {
        let (name, kind) = self
            .inbound
            .get(&packet.id)
            .ok_or(NetworkError::UnhandledPacket(packet.id))?;

        let mut buffer = Buffer::from_bytes(&packet.payload);
        let data = kind.decode(&mut buffer)?;
        if buffer.remaining() > 0 {
            log::debug!(
                "Ignoring {remaining} trailing bytes of {name}",
                remaining = buffer.remaining()
            );
        }

        Ok(Event::new(name.clone(), data))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::checkers::{PieceType, Player, Pos, Size, Team};

    #[test]
    fn create_piece_layout() {
        let routes = PacketRoutes::server().unwrap();
        let event = Event::new(
            names::CREATE_PIECE,
            EventData::Piece {
                pos: Pos::new(3, 4),
                piece: PieceType::RedKing,
            },
        );
        let packet = routes.encode(&event).unwrap();
        assert_eq!(packet, Packet::new(1, vec![3u8, 4, 2]));

        // The client end decodes it back
        let client = PacketRoutes::client().unwrap();
        assert_eq!(client.decode(&packet).unwrap(), event);
    }

    #[test]
    fn every_server_payload() {
        let server = PacketRoutes::server().unwrap();
        let client = PacketRoutes::client().unwrap();
        let (from, to) = (Pos::new(1, 2), Pos::new(3, 4));
        let events = [
            (names::NO_ACTIONS, EventData::Empty),
            (names::SELECT_PIECE, EventData::Selection { pos: from, selected: true }),
            (names::CREATE_TILE, EventData::Position(to)),
            (names::DELETE_TILE, EventData::Position(to)),
            (names::DELETE_PIECE_ANIMATION, EventData::Position(from)),
            (
                names::UPDATE_PIECE_ANIMATION,
                EventData::Piece { pos: to, piece: PieceType::BlackKing },
            ),
            (names::MOVE_PIECE_ANIMATION, EventData::Movement { from, to }),
            (names::ANIMATION_STATE, EventData::Flag(false)),
            (names::GAME_OVER, EventData::Player(Player::Black)),
            (names::ACTION_COMPLETE, EventData::ActionComplete { from, to, turn: true }),
            (
                names::INITIAL_CONFIG,
                EventData::InitialConfig { size: Size::new(8, 6), turn: false },
            ),
            (names::PLAYING_AS, EventData::Team(Team::Spectator)),
        ];
        for (name, data) in events {
            let event = Event::new(name, data);
            let packet = server.encode(&event).unwrap();
            assert_eq!(client.decode(&packet).unwrap(), event);
        }

        let click = Event::new(names::TILE_CLICKED, EventData::Position(to));
        let packet = client.encode(&click).unwrap();
        assert_eq!(packet.id, 1);
        assert_eq!(server.decode(&packet).unwrap(), click);
    }

    #[test]
    fn routing_errors() {
        let server = PacketRoutes::server().unwrap();
        assert_matches!(
            server.encode(&Event::new("unknown", EventData::Empty)),
            Err(NetworkError::UnhandledEvent(_))
        );
        assert_matches!(
            server.encode(&Event::new(names::CREATE_TILE, EventData::Flag(true))),
            Err(NetworkError::PayloadMismatch { .. })
        );
        assert_matches!(
            server.decode(&Packet::new(42, Vec::new())),
            Err(NetworkError::UnhandledPacket(42))
        );
        assert_matches!(
            server.decode(&Packet::new(0, vec![1u8])),
            Err(NetworkError::Buffer(_))
        );
    }

    #[test]
    fn route_registration() {
        let mut routes = PacketRoutes::new();
        routes
            .register_outbound("ping", 0, PayloadKind::Empty)
            .unwrap();
        assert_matches!(
            routes.register_inbound("ping", 0, PayloadKind::Empty),
            Err(NetworkError::SelfLoop(_))
        );
        assert_matches!(
            routes.register_outbound("ping", 1, PayloadKind::Empty),
            Err(NetworkError::DuplicateRoute(_))
        );
        assert_matches!(
            routes.register_outbound("pong", 0, PayloadKind::Empty),
            Err(NetworkError::DuplicateRoute(_))
        );
        // Same id in the other direction is fine
        routes.register_inbound("pong", 0, PayloadKind::Empty).unwrap();
        assert!(routes.is_outbound("ping"));
        assert!(!routes.is_outbound("pong"));
    }
}
