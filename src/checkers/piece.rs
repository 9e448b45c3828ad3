use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::StateError;

/// Checkers players
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Player {
    /// Moves towards the top of the board (decreasing `y`)
    Red = 0,
    /// Moves towards the bottom of the board (increasing `y`)
    Black = 1,
}

impl Player {
    /// List all player variants
    pub const fn variants() -> [Player; 2] {
        [Player::Red, Player::Black]
    }

    pub const fn opponent(&self) -> Self {
        match self {
            Player::Red => Player::Black,
            Player::Black => Player::Red,
        }
    }

    /// Player to move for a turn flag (`false` = red, `true` = black)
    pub const fn from_turn(turn: bool) -> Self {
        if turn { Player::Black } else { Player::Red }
    }

    /// Turn flag for this player
    pub const fn turn(&self) -> bool {
        matches!(self, Player::Black)
    }

    pub const fn pawn(&self) -> PieceType {
        match self {
            Player::Red => PieceType::RedPawn,
            Player::Black => PieceType::BlackPawn,
        }
    }

    pub const fn king(&self) -> PieceType {
        self.pawn().promoted()
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Player::Red),
            1 => Some(Player::Black),
            _ => None,
        }
    }
}

impl Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Player::Red => write!(f, "Red"),
            Player::Black => write!(f, "Black"),
        }
    }
}

/// Type of a piece on the board
///
/// Bit 0 holds the colour and bit 1 the crown, so the player of a piece is
/// `type & 1` and its enemy pawn is `(type + 1) & 1`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PieceType {
    RedPawn = 0,
    BlackPawn = 1,
    RedKing = 2,
    BlackKing = 3,
}

impl PieceType {
    pub const fn variants() -> [PieceType; 4] {
        [
            PieceType::RedPawn,
            PieceType::BlackPawn,
            PieceType::RedKing,
            PieceType::BlackKing,
        ]
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PieceType::RedPawn),
            1 => Some(PieceType::BlackPawn),
            2 => Some(PieceType::RedKing),
            3 => Some(PieceType::BlackKing),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }

    #[inline(always)]
    pub const fn player(&self) -> Player {
        match self.as_u8() & 1 {
            0 => Player::Red,
            _ => Player::Black,
        }
    }

    #[inline(always)]
    pub const fn is_king(&self) -> bool {
        self.as_u8() >= 2
    }

    /// Pawn type of the opposing player
    pub const fn enemy_pawn(&self) -> PieceType {
        self.player().opponent().pawn()
    }

    /// Whether `other` belongs to the opposing player
    #[inline(always)]
    pub const fn is_enemy(&self, other: PieceType) -> bool {
        (self.as_u8() ^ other.as_u8()) & 1 == 1
    }

    /// Crowned version of this piece. Kings stay kings.
    pub const fn promoted(&self) -> PieceType {
        match self {
            PieceType::RedPawn | PieceType::RedKing => PieceType::RedKing,
            PieceType::BlackPawn | PieceType::BlackKing => PieceType::BlackKing,
        }
    }

    /// Material weight used by the evaluation: pawns count 1, kings 3
    pub const fn material(&self) -> u32 {
        if self.is_king() { 3 } else { 1 }
    }

    /// Single character representation used by the board display
    pub const fn char(&self) -> char {
        match self {
            PieceType::RedPawn => 'r',
            PieceType::BlackPawn => 'b',
            PieceType::RedKing => 'R',
            PieceType::BlackKing => 'B',
        }
    }
}

impl TryFrom<u8> for PieceType {
    type Error = StateError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PieceType::from_u8(value).ok_or(StateError::InvalidPiece(value))
    }
}

impl From<PieceType> for u8 {
    fn from(piece: PieceType) -> Self {
        piece.as_u8()
    }
}

impl Display for PieceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_king() { "king" } else { "pawn" };
        write!(f, "{player} {kind}", player = self.player())
    }
}

/// Side a connected client plays
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Red,
    Black,
    /// Internal singleplayer: controls whichever side is to move
    Any,
    Spectator,
}

impl Team {
    /// Wire value of a spectator (the byte image of `-1`)
    pub const SPECTATOR_BYTE: u8 = 0xFF;

    /// Check whether this team may act for `player`
    pub const fn controls(&self, player: Player) -> bool {
        match self {
            Team::Red => matches!(player, Player::Red),
            Team::Black => matches!(player, Player::Black),
            Team::Any => true,
            Team::Spectator => false,
        }
    }

    pub const fn as_u8(&self) -> u8 {
        match self {
            Team::Red => 0,
            Team::Black => 1,
            Team::Any => 2,
            Team::Spectator => Self::SPECTATOR_BYTE,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Team::Red),
            1 => Some(Team::Black),
            2 => Some(Team::Any),
            Self::SPECTATOR_BYTE => Some(Team::Spectator),
            _ => None,
        }
    }
}

impl From<Player> for Team {
    fn from(player: Player) -> Self {
        match player {
            Player::Red => Team::Red,
            Player::Black => Team::Black,
        }
    }
}

impl Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Team::Red => write!(f, "red"),
            Team::Black => write!(f, "black"),
            Team::Any => write!(f, "any"),
            Team::Spectator => write!(f, "spectator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_bits() {
        for piece in PieceType::variants() {
            assert_eq!(piece.player() as u8, piece.as_u8() & 1);
            assert_eq!(piece.is_king(), piece.as_u8() >= 2);
            assert_eq!(piece.enemy_pawn().as_u8(), (piece.as_u8() + 1) & 1);
            assert_eq!(PieceType::from_u8(piece.as_u8()), Some(piece));
        }
        assert_eq!(PieceType::RedPawn.promoted(), PieceType::RedKing);
        assert_eq!(PieceType::BlackPawn.promoted().as_u8(), 3);
        assert!(PieceType::RedKing.is_enemy(PieceType::BlackPawn));
        assert!(!PieceType::RedKing.is_enemy(PieceType::RedPawn));
        assert_eq!(PieceType::from_u8(4), None);
    }

    #[test]
    fn team_control() {
        assert!(Team::Any.controls(Player::Red));
        assert!(Team::Any.controls(Player::Black));
        assert!(!Team::Spectator.controls(Player::Black));
        assert!(Team::Black.controls(Player::Black));
        assert!(!Team::Black.controls(Player::Red));
        assert_eq!(Team::from_u8(255), Some(Team::Spectator));
        assert_eq!(Team::from(Player::Red).as_u8(), 0);
    }
}
