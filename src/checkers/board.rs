use std::{
    fmt::Display,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

use super::{
    StateError,
    piece::{PieceType, Player},
};

/// Default board edge length
pub const DEFAULT_BOARD_LENGTH: u8 = 8;

/// Cell coordinates, `(0, 0)` being the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub x: u8,
    pub y: u8,
}

impl Pos {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Pieces may only stand on cells where `(x + y + 1) mod 2 == 0`
    #[inline(always)]
    pub const fn is_playable(&self) -> bool {
        (self.x as u16 + self.y as u16 + 1) % 2 == 0
    }

    /// Cell `steps` cells away in the direction of `side`, if it lies on a board of `size`
    pub fn step(&self, side: Side, steps: u8, size: Size) -> Option<Pos> {
        let (dx, dy) = side.delta();
        let x = self.x as i16 + dx as i16 * steps as i16;
        let y = self.y as i16 + dy as i16 * steps as i16;
        if x < 0 || y < 0 {
            return None;
        }
        let pos = Pos::new(u8::try_from(x).ok()?, u8::try_from(y).ok()?);
        size.contains(pos).then_some(pos)
    }

    /// Diagonal side leading from `self` towards `other`, if they share a diagonal
    pub fn side_towards(&self, other: Pos) -> Option<Side> {
        let dx = other.x as i16 - self.x as i16;
        let dy = other.y as i16 - self.y as i16;
        if dx == 0 || dx.abs() != dy.abs() {
            return None;
        }
        Side::variants()
            .into_iter()
            .find(|side| side.delta() == (dx.signum() as i8, dy.signum() as i8))
    }
}

impl From<(u8, u8)> for Pos {
    fn from((x, y): (u8, u8)) -> Self {
        Pos::new(x, y)
    }
}

impl Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Board dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u8,
    pub height: u8,
}

impl Size {
    pub const fn new(width: u8, height: u8) -> Self {
        Self { width, height }
    }

    #[inline(always)]
    pub const fn contains(&self, pos: Pos) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    #[inline(always)]
    pub const fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row on which pieces of `player` get crowned
    pub const fn promotion_row(&self, player: Player) -> u8 {
        match player {
            Player::Red => 0,
            Player::Black => self.height.saturating_sub(1),
        }
    }

    /// Upper bound on the number of hops searched between two promotions:
    /// `ceil((W² + H²)^¼)`
    pub fn chain_depth(&self) -> usize {
        let w = self.width as f64;
        let h = self.height as f64;
        (w * w + h * h).powf(0.25).ceil() as usize
    }

    /// Iterate over every cell, row by row
    pub fn cells(&self) -> impl Iterator<Item = Pos> + use<> {
        let Size { width, height } = *self;
        (0..height).flat_map(move |y| (0..width).map(move |x| Pos::new(x, y)))
    }

    #[inline(always)]
    fn index_of(&self, pos: Pos) -> usize {
        pos.y as usize * self.width as usize + pos.x as usize
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(DEFAULT_BOARD_LENGTH, DEFAULT_BOARD_LENGTH)
    }
}

impl Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Diagonal directions, in enumeration order
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    TopLeft,    TopRight,

    BottomLeft, BottomRight,
}

impl Side {
    /// List all sides in the order used for tie-breaking
    pub const fn variants() -> [Side; 4] {
        [
            Side::TopLeft,
            Side::TopRight,
            Side::BottomLeft,
            Side::BottomRight,
        ]
    }

    pub const fn delta(&self) -> (i8, i8) {
        match self {
            Side::TopLeft => (-1, -1),
            Side::TopRight => (1, -1),
            Side::BottomLeft => (-1, 1),
            Side::BottomRight => (1, 1),
        }
    }

    /// Red advances towards the top, black towards the bottom
    pub const fn is_forward_for(&self, player: Player) -> bool {
        match player {
            Player::Red => matches!(self, Side::TopLeft | Side::TopRight),
            Player::Black => matches!(self, Side::BottomLeft | Side::BottomRight),
        }
    }
}

/// Dense board storage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Board {
    size: Size,
    cells: Box<[Option<PieceType>]>,
}

impl Index<Pos> for Board {
    type Output = Option<PieceType>;

    fn index(&self, pos: Pos) -> &Self::Output {
        debug_assert!(self.size.contains(pos), "Index out of bounds: {pos}");
        &self.cells[self.size.index_of(pos)]
    }
}

impl IndexMut<Pos> for Board {
    fn index_mut(&mut self, pos: Pos) -> &mut Self::Output {
        debug_assert!(self.size.contains(pos), "Index out of bounds: {pos}");
        let index = self.size.index_of(pos);
        &mut self.cells[index]
    }
}

impl Board {
    /// Creates an empty board
    pub fn empty(size: Size) -> Self {
        Self {
            size,
            cells: vec![None; size.area()].into_boxed_slice(),
        }
    }

    /// Creates a board holding the given pieces
    pub fn with_pieces(
        size: Size,
        pieces: impl IntoIterator<Item = (Pos, PieceType)>,
    ) -> Result<Self, StateError> {
        let mut board = Self::empty(size);
        for (pos, piece) in pieces {
            board.place(pos, piece)?;
        }
        Ok(board)
    }

    /// Places a piece, checking that the cell exists and is playable
    pub fn place(&mut self, pos: Pos, piece: PieceType) -> Result<(), StateError> {
        if !self.size.contains(pos) {
            return Err(StateError::OutOfBounds(pos));
        }
        if !pos.is_playable() {
            return Err(StateError::Unplayable(pos));
        }
        self[pos] = Some(piece);
        Ok(())
    }

    pub const fn size(&self) -> Size {
        self.size
    }

    /// Piece at `pos`. Cells outside the board read as empty.
    #[inline(always)]
    pub fn get(&self, pos: Pos) -> Option<PieceType> {
        if self.size.contains(pos) {
            self[pos]
        } else {
            None
        }
    }

    /// Removes and returns the piece at `pos`
    pub fn take(&mut self, pos: Pos) -> Option<PieceType> {
        if self.size.contains(pos) {
            self[pos].take()
        } else {
            None
        }
    }

    /// Iterate over all pieces, row by row
    pub fn iter_pieces(&self) -> impl Iterator<Item = (Pos, PieceType)> + '_ {
        self.size
            .cells()
            .filter_map(move |pos| self[pos].map(|piece| (pos, piece)))
    }

    /// Iterate over the pieces of a given player
    pub fn iter_player_pieces(&self, player: Player) -> impl Iterator<Item = (Pos, PieceType)> + '_ {
        self.iter_pieces()
            .filter(move |(_, piece)| piece.player() == player)
    }

    pub fn count(&self, player: Player) -> usize {
        self.iter_player_pieces(player).count()
    }
}

/// Initial setup: black fills the top rows, red the bottom rows,
/// leaving two empty rows in the middle
pub fn generate_pieces(size: Size) -> Vec<(Pos, PieceType)> {
    let rows = size.height.saturating_sub(2) / 2;
    size.cells()
        .filter(Pos::is_playable)
        .filter_map(|pos| {
            if pos.y < rows {
                Some((pos, PieceType::BlackPawn))
            } else if pos.y >= size.height - rows {
                Some((pos, PieceType::RedPawn))
            } else {
                None
            }
        })
        .collect()
}

/// Board display
impl Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for y in 0..self.size.height {
            for x in 0..self.size.width {
                let pos = Pos::new(x, y);
                match self[pos] {
                    Some(piece) => write!(f, "{} ", piece.char())?,
                    None if pos.is_playable() => write!(f, ". ")?,
                    None => write!(f, "  ")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
