use std::collections::VecDeque;

use crate::checkers::{PieceType, Player, Pos};

/// Step replayed by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    Move { from: Pos, to: Pos },
    Delete(Pos),
    Update { pos: Pos, piece: PieceType },
    /// Start (`true`) or end (`false`) of an animation block
    State(bool),
    GameOver(Player),
}

impl Animation {
    /// Closes an open animation block
    fn ends_block(&self) -> bool {
        matches!(self, Animation::State(false) | Animation::GameOver(_))
    }
}

/// FIFO of pending animations.
///
/// A block is only released once its end marker arrived, so a renderer never
/// plays half of an action.
#[derive(Debug, Default, Clone)]
pub struct AnimationQueue {
    queue: VecDeque<Animation>,
}

impl AnimationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, animation: Animation) {
        self.queue.push_back(animation);
    }

    /// Next animation, or `None` while the front block is incomplete
    pub fn pop(&mut self) -> Option<Animation> {
        if self.front_block_open() {
            return None;
        }
        self.queue.pop_front()
    }

    fn front_block_open(&self) -> bool {
        match self.queue.front() {
            Some(Animation::State(true)) => !self.queue.iter().skip(1).any(Animation::ends_block),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
