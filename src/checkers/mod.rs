//! # Checkers rule engine
//!
//! Immutable game state for American checkers (English draughts): action
//! enumeration, application and win detection. Every applied action
//! produces a brand new [`State`]; nothing here performs I/O.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Board geometry and storage
pub mod board;

/// Piece types, players and teams
pub mod piece;

/// Move and jump generation
pub mod actions;

pub use actions::{Action, ActionSet, ActionStep, Jumps};
pub use board::{Board, Pos, Side, Size, generate_pieces};
pub use piece::{PieceType, Player, Team};

/// Errors raised by the rule engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The action is not among the legal actions of the player to move
    #[error("illegal action {0}")]
    IllegalAction(Action),
    /// No piece stands at the given position
    #[error("no piece at {0}")]
    IllegalPosition(Pos),
    /// Unknown piece type value
    #[error("invalid piece type {0}")]
    InvalidPiece(u8),
    /// Position outside of the board
    #[error("position {0} is outside of the board")]
    OutOfBounds(Pos),
    /// Position on a cell pieces may not occupy
    #[error("position {0} is not a playable cell")]
    Unplayable(Pos),
}

/// Rule variations selectable per game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rules {
    /// Only jumps are legal whenever the player to move can jump
    pub mandatory_capture: bool,
    /// Pawns only jump in their forward directions
    pub pawn_jump_forward_only: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            mandatory_capture: true,
            pawn_jump_forward_only: true,
        }
    }
}

/// Immutable game state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StateRepr", into = "StateRepr")]
pub struct State {
    /// Board with all live pieces
    board: Board,
    /// `false`: red moves, `true`: black moves
    turn: bool,
    /// Rule variations in force
    rules: Rules,
}

impl State {
    /// Creates a state holding the given pieces
    pub fn new(
        size: Size,
        pieces: impl IntoIterator<Item = (Pos, PieceType)>,
        player: Player,
        rules: Rules,
    ) -> Result<Self, StateError> {
        Ok(Self {
            board: Board::with_pieces(size, pieces)?,
            turn: player.turn(),
            rules,
        })
    }

    /// Creates a state with the initial setup of a board of `size`
    pub fn initial(size: Size, player: Player, rules: Rules) -> Self {
        let mut board = Board::empty(size);
        for (pos, piece) in generate_pieces(size) {
            board[pos] = Some(piece);
        }
        Self {
            board,
            turn: player.turn(),
            rules,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn size(&self) -> Size {
        self.board.size()
    }

    pub fn rules(&self) -> Rules {
        self.rules
    }

    /// Turn flag: `false` when red moves, `true` when black moves
    pub fn turn(&self) -> bool {
        self.turn
    }

    /// Player to move
    pub fn player(&self) -> Player {
        Player::from_turn(self.turn)
    }

    pub fn piece(&self, pos: Pos) -> Option<PieceType> {
        self.board.get(pos)
    }

    pub fn pieces(&self) -> impl Iterator<Item = (Pos, PieceType)> + '_ {
        self.board.iter_pieces()
    }

    /// Copy of this state with another player to move
    pub fn with_player(&self, player: Player) -> Self {
        Self {
            turn: player.turn(),
            ..self.clone()
        }
    }

    /// True iff `pos` holds a piece of `player`
    pub fn can_player_select(&self, player: Player, pos: Pos) -> bool {
        self.board
            .get(pos)
            .is_some_and(|piece| piece.player() == player)
    }

    /// Winner of the game: the opponent of the player to move,
    /// when that player has no legal action left
    pub fn winner(&self) -> Option<Player> {
        let player = self.player();
        if self.has_legal_action(player) {
            None
        } else {
            Some(player.opponent())
        }
    }
}

/// Board display
impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{board}To move: {player}", board = self.board, player = self.player())
    }
}

/// Serialized form of a [`State`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateRepr {
    size: Size,
    pieces: Vec<(Pos, PieceType)>,
    player: Player,
    #[serde(default)]
    rules: Rules,
}

impl From<State> for StateRepr {
    fn from(state: State) -> Self {
        Self {
            size: state.size(),
            pieces: state.pieces().collect(),
            player: state.player(),
            rules: state.rules,
        }
    }
}

impl TryFrom<StateRepr> for State {
    type Error = StateError;

    fn try_from(repr: StateRepr) -> Result<Self, Self::Error> {
        State::new(repr.size, repr.pieces, repr.player, repr.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winner_when_no_action_left() {
        // Black to move without any piece
        let state = State::new(
            Size::default(),
            [(Pos::new(1, 6), PieceType::RedPawn)],
            Player::Black,
            Rules::default(),
        )
        .unwrap();
        assert_eq!(state.winner(), Some(Player::Red));

        // Black blocked in the corner
        let state = State::new(
            Size::default(),
            [
                (Pos::new(0, 7), PieceType::BlackPawn),
                (Pos::new(5, 2), PieceType::RedPawn),
            ],
            Player::Black,
            Rules::default(),
        )
        .unwrap();
        assert_eq!(state.winner(), Some(Player::Red));
        assert_eq!(state.with_player(Player::Red).winner(), None);
    }

    #[test]
    fn initial_state_is_ongoing() {
        let state = State::initial(Size::default(), Player::Black, Rules::default());
        assert_eq!(state.pieces().count(), 24);
        assert_eq!(state.winner(), None);
        assert!(state.turn());
    }

    #[test]
    fn select_own_pieces_only() {
        let state = State::initial(Size::default(), Player::Black, Rules::default());
        assert!(state.can_player_select(Player::Black, Pos::new(1, 2)));
        assert!(!state.can_player_select(Player::Red, Pos::new(1, 2)));
        assert!(!state.can_player_select(Player::Black, Pos::new(0, 3)));
    }

    #[test]
    fn json_representation() {
        let state = State::new(
            Size::default(),
            [
                (Pos::new(1, 2), PieceType::BlackKing),
                (Pos::new(2, 3), PieceType::RedPawn),
            ],
            Player::Red,
            Rules::default(),
        )
        .unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);

        let invalid = r#"{"size":{"width":8,"height":8},"pieces":[[{"x":0,"y":0},1]],"player":"red"}"#;
        assert!(serde_json::from_str::<State>(invalid).is_err());
    }
}
