//! Checkers hooks for the minimax search.
//!
//! Black is the maximizing side: a positive value favours black.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::{
    checkers::{Action, PieceType, Player, Size, State, StateError},
    config::AiConfig,
};

use super::{HIGHEST, Minimax, SearchResult, Searcher, adaptive_depth};

/// Fixed seed of the Zobrist keys, so hashes are stable across runs
const ZOBRIST_SEED: u64 = 0x636b_6572_7321;

/// Minimax hooks for one board size
#[derive(Debug, Clone)]
pub struct CheckersAi {
    size: Size,
    /// One key per cell and piece type
    keys: Vec<u64>,
    black_key: u64,
}

impl CheckersAi {
    pub fn new(size: Size) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(
            ZOBRIST_SEED ^ (((size.width as u64) << 8) | size.height as u64),
        );
        let keys = (0..size.area() * PieceType::variants().len())
            .map(|_| rng.random())
            .collect();
        Self {
            size,
            keys,
            black_key: rng.random(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// `pawns + 3·kings` of `player`
    pub fn material(state: &State, player: Player) -> u32 {
        state
            .board()
            .iter_player_pieces(player)
            .map(|(_, piece)| piece.material())
            .sum()
    }
}

impl Minimax for CheckersAi {
    type State = State;
    type Action = Action;
    type Error = StateError;

    fn value(&self, state: &State) -> f64 {
        if let Some(winner) = state.winner() {
            return match winner {
                Player::Black => HIGHEST,
                Player::Red => -HIGHEST,
            };
        }
        let max = Self::material(state, Player::Black) as f64;
        let min = Self::material(state, Player::Red) as f64;
        (max - min) / (max + min + 1.0)
    }

    fn terminal(&self, state: &State) -> bool {
        state.winner().is_some()
    }

    fn maximizing(&self, state: &State) -> bool {
        state.turn()
    }

    fn actions(&self, state: &State) -> Vec<Action> {
        state.legal_actions(state.player())
    }

    fn result(&self, state: &State, action: Action) -> Result<State, StateError> {
        state.apply(action)
    }

    fn hash(&self, state: &State) -> u64 {
        let width = self.size.width as usize;
        let variants = PieceType::variants().len();
        let pieces = state.pieces().fold(0, |hash, (pos, piece)| {
            let cell = pos.y as usize * width + pos.x as usize;
            hash ^ self.keys[cell * variants + piece.as_u8() as usize]
        });
        if state.turn() {
            pieces ^ self.black_key
        } else {
            pieces
        }
    }
}

/// Picks an action for the player to move in `state`.
///
/// `searcher` must have been built for the board size of `state`.
pub fn decide(
    searcher: &mut Searcher<CheckersAi>,
    state: &State,
    config: &AiConfig,
) -> Result<SearchResult<Action>, StateError> {
    let max_depth = if config.adaptive {
        let value = searcher.game().value(state);
        adaptive_depth(value, config.min_depth, config.max_depth)
    } else {
        config.max_depth
    };
    searcher.iterative_deepening(state, config.min_depth.max(1), max_depth, config.budget)
}
