use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::checkers::{PieceType, Player, Pos, Size, Team};

/// Errors raised while reading from a [`Buffer`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("requested {requested} bytes but only {remaining} remain")]
    UnexpectedEnd { requested: usize, remaining: usize },
    #[error("invalid {kind} value {value}")]
    InvalidValue { kind: &'static str, value: u32 },
}

/// Growable byte buffer with a read cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: BytesMut,
    cursor: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer holding `bytes`, cursor at the start
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            cursor: 0,
        }
    }

    /// Appends bytes at the end
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Reads the next `n` unread bytes
    pub fn read(&mut self, n: usize) -> Result<&[u8], BufferError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(BufferError::UnexpectedEnd {
                requested: n,
                remaining,
            });
        }
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.data[start..self.cursor])
    }

    /// Moves the cursor back to the start
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Drops all content
    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    /// Drops the bytes already read, keeping the unread ones
    pub fn clear_already_read(&mut self) {
        self.data.advance(self.cursor);
        self.cursor = 0;
    }

    /// Reads every remaining byte
    pub fn flush(&mut self) -> &[u8] {
        let start = self.cursor;
        self.cursor = self.data.len();
        &self.data[start..]
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whole content, read or not
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> BytesMut {
        self.data
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.read(1)?[0])
    }

    /// Big-endian
    pub fn write_u32(&mut self, value: u32) {
        self.data.put_u32(value);
    }

    pub fn read_u32(&mut self) -> Result<u32, BufferError> {
        let mut bytes = self.read(4)?;
        Ok(bytes.get_u32())
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    /// Any non-zero byte reads as `true`
    pub fn read_bool(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_u8()? != 0)
    }

    /// `u32` length, then the bytes
    pub fn write_array(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.write(bytes);
    }

    pub fn read_array(&mut self) -> Result<Vec<u8>, BufferError> {
        let len = self.read_u32()? as usize;
        Ok(self.read(len)?.to_vec())
    }

    pub fn write_pos(&mut self, pos: Pos) {
        self.write_u8(pos.x);
        self.write_u8(pos.y);
    }

    pub fn read_pos(&mut self) -> Result<Pos, BufferError> {
        let x = self.read_u8()?;
        let y = self.read_u8()?;
        Ok(Pos::new(x, y))
    }

    pub fn write_size(&mut self, size: Size) {
        self.write_u8(size.width);
        self.write_u8(size.height);
    }

    pub fn read_size(&mut self) -> Result<Size, BufferError> {
        let width = self.read_u8()?;
        let height = self.read_u8()?;
        Ok(Size::new(width, height))
    }

    pub fn write_piece(&mut self, piece: PieceType) {
        self.write_u8(piece.as_u8());
    }

    pub fn read_piece(&mut self) -> Result<PieceType, BufferError> {
        let value = self.read_u8()?;
        PieceType::from_u8(value).ok_or(BufferError::InvalidValue {
            kind: "piece type",
            value: value as u32,
        })
    }

    pub fn write_player(&mut self, player: Player) {
        self.write_u8(player as u8);
    }

    pub fn read_player(&mut self) -> Result<Player, BufferError> {
        let value = self.read_u8()?;
        Player::from_u8(value).ok_or(BufferError::InvalidValue {
            kind: "player",
            value: value as u32,
        })
    }

    pub fn write_team(&mut self, team: Team) {
        self.write_u8(team.as_u8());
    }

    pub fn read_team(&mut self) -> Result<Team, BufferError> {
        let value = self.read_u8()?;
        Team::from_u8(value).ok_or(BufferError::InvalidValue {
            kind: "team",
            value: value as u32,
        })
    }
}
