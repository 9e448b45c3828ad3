//! # Minimax search
//!
//! Generic adversarial search over any game implementing [`Minimax`]:
//! plain minimax, α-β pruning, and a [`Searcher`] adding a transposition
//! table, iterative deepening and a wall-clock budget.
//!
//! Values lie in `[-1, 1]`, positive values favouring the maximizing side.

use std::{
    fmt::Debug,
    time::{Duration, Instant},
};

use serde::Serialize;

pub mod checkers;
pub mod machine;
pub mod table;

pub use checkers::CheckersAi;
pub use table::{Bound, Entry, TranspositionTable};

/// Saturated value of a won position
pub const HIGHEST: f64 = 1.0;

/// Game hooks needed by the search
pub trait Minimax {
    type State;
    type Action: Copy + Debug;
    type Error;

    /// Static value of `state`, from the maximizing side's view
    fn value(&self, state: &Self::State) -> f64;

    fn terminal(&self, state: &Self::State) -> bool;

    /// True when the maximizing side is to move
    fn maximizing(&self, state: &Self::State) -> bool;

    fn actions(&self, state: &Self::State) -> Vec<Self::Action>;

    fn result(&self, state: &Self::State, action: Self::Action) -> Result<Self::State, Self::Error>;

    /// Position hash for the transposition table
    fn hash(&self, state: &Self::State) -> u64;
}

/// Value of a searched position and the action reaching it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchResult<A> {
    pub value: f64,
    /// `None` at leaves
    pub action: Option<A>,
}

impl<A> SearchResult<A> {
    fn leaf(value: f64) -> Self {
        Self {
            value,
            action: None,
        }
    }

    fn worst(maximizing: bool) -> Self {
        Self::leaf(if maximizing {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        })
    }

    /// Keeps the better of `self` and `value` reached through `action`
    fn improve(&mut self, maximizing: bool, value: f64, action: A) {
        let better = if maximizing {
            value > self.value
        } else {
            value < self.value
        };
        if better || self.action.is_none() {
            self.value = value;
            self.action = Some(action);
        }
    }
}

/// Depth-bounded minimax
pub fn minimax<G: Minimax>(
    game: &G,
    state: &G::State,
    depth: usize,
) -> Result<SearchResult<G::Action>, G::Error> {
    if depth == 0 || game.terminal(state) {
        return Ok(SearchResult::leaf(game.value(state)));
    }
    let actions = game.actions(state);
    if actions.is_empty() {
        return Ok(SearchResult::leaf(game.value(state)));
    }

    let maximizing = game.maximizing(state);
    let mut best = SearchResult::worst(maximizing);
    for action in actions {
        let child = game.result(state, action)?;
        let value = minimax(game, &child, depth - 1)?.value;
        best.improve(maximizing, value, action);
    }
    Ok(best)
}

/// Minimax with α-β pruning
pub fn alpha_beta<G: Minimax>(
    game: &G,
    state: &G::State,
    depth: usize,
    mut alpha: f64,
    mut beta: f64,
) -> Result<SearchResult<G::Action>, G::Error> {
    if depth == 0 || game.terminal(state) {
        return Ok(SearchResult::leaf(game.value(state)));
    }
    let actions = game.actions(state);
    if actions.is_empty() {
        return Ok(SearchResult::leaf(game.value(state)));
    }

    let maximizing = game.maximizing(state);
    let mut best = SearchResult::worst(maximizing);
    for action in actions {
        let child = game.result(state, action)?;
        let value = alpha_beta(game, &child, depth - 1, alpha, beta)?.value;
        best.improve(maximizing, value, action);
        if maximizing {
            alpha = alpha.max(best.value);
        } else {
            beta = beta.min(best.value);
        }
        // Cut-off
        if alpha >= beta {
            break;
        }
    }
    Ok(best)
}

/// Search depth derived from the position value: `floor(value·max + min)`
/// clamped to `[min, max]`
pub fn adaptive_depth(value: f64, min_depth: usize, max_depth: usize) -> usize {
    let min = min_depth as f64;
    let max = (max_depth.max(min_depth)) as f64;
    (value * max + min).floor().clamp(min, max) as usize
}

/// α-β search with a transposition table, reused across decisions
#[derive(Debug)]
pub struct Searcher<G: Minimax> {
    game: G,
    table: TranspositionTable<G::Action>,
    deadline: Option<Instant>,
    nodes: u64,
}

impl<G: Minimax> Searcher<G> {
    pub fn new(game: G, table_capacity: usize) -> Self {
        Self {
            game,
            table: TranspositionTable::new(table_capacity),
            deadline: None,
            nodes: 0,
        }
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn table(&self) -> &TranspositionTable<G::Action> {
        &self.table
    }

    /// Nodes visited by the last search
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    /// Full-window search to `depth`
    pub fn search(
        &mut self,
        state: &G::State,
        depth: usize,
    ) -> Result<SearchResult<G::Action>, G::Error> {
        self.deadline = None;
        self.nodes = 0;
        let result = self.node(state, depth, -HIGHEST, HIGHEST)?;
        // Without a deadline the search always completes
        Ok(result.unwrap_or_else(|| SearchResult::leaf(self.game.value(state))))
    }

    /// Searches `min_depth..=max_depth`, returning the deepest completed result.
    ///
    /// The first depth always completes; deeper ones are dropped once `budget`
    /// runs out. Stops early on a saturated value.
    pub fn iterative_deepening(
        &mut self,
        state: &G::State,
        min_depth: usize,
        max_depth: usize,
        budget: Option<Duration>,
    ) -> Result<SearchResult<G::Action>, G::Error> {
        let start = Instant::now();
        let mut best = self.search(state, min_depth)?;
        let mut nodes = self.nodes;
        log::debug!("Depth {min_depth}: value {:.3}", best.value);

        self.deadline = budget.map(|budget| start + budget);
        for depth in (min_depth + 1)..=max_depth {
            if best.value.abs() >= HIGHEST {
                break;
            }
            self.nodes = 0;
            let Some(result) = self.node(state, depth, -HIGHEST, HIGHEST)? else {
                log::debug!("Budget exhausted during depth {depth}");
                break;
            };
            nodes += self.nodes;
            log::debug!("Depth {depth}: value {:.3}", result.value);
            best = result;
        }

        self.deadline = None;
        self.nodes = nodes;
        log::debug!(
            "Searched {nodes} nodes in {elapsed:?}",
            elapsed = start.elapsed()
        );
        Ok(best)
    }

    /// α-β node with table lookups; `None` when the deadline passed
    fn node(
        &mut self,
        state: &G::State,
        depth: usize,
        mut alpha: f64,
        mut beta: f64,
    ) -> Result<Option<SearchResult<G::Action>>, G::Error> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(None);
        }
        self.nodes += 1;

        if depth == 0 || self.game.terminal(state) {
            return Ok(Some(SearchResult::leaf(self.game.value(state))));
        }

        let hash = self.game.hash(state);
        let window = (alpha, beta);
        if let Some(result) = self.table.probe(hash, depth, &mut alpha, &mut beta) {
            return Ok(Some(result));
        }

        let actions = self.game.actions(state);
        if actions.is_empty() {
            return Ok(Some(SearchResult::leaf(self.game.value(state))));
        }

        let maximizing = self.game.maximizing(state);
        let mut best = SearchResult::worst(maximizing);
        for action in actions {
            let child = self.game.result(state, action)?;
            let Some(result) = self.node(&child, depth - 1, alpha, beta)? else {
                return Ok(None);
            };
            best.improve(maximizing, result.value, action);
            if maximizing {
                alpha = alpha.max(best.value);
            } else {
                beta = beta.min(best.value);
            }
            if alpha >= beta {
                break;
            }
        }

        let bound = if best.value <= window.0 {
            Bound::Upper
        } else if best.value >= window.1 {
            Bound::Lower
        } else {
            Bound::Exact
        };
        self.table.insert(
            hash,
            Entry {
                depth,
                result: best,
                bound,
            },
        );
        Ok(Some(best))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    /// Take one or two stones, whoever takes the last one wins
    struct Nim;

    #[derive(Debug, Clone, Copy)]
    struct Heap {
        stones: u8,
        /// Maximizing side to move
        first: bool,
    }

    impl Minimax for Nim {
        type State = Heap;
        type Action = u8;
        type Error = Infallible;

        fn value(&self, state: &Heap) -> f64 {
            match (state.stones, state.first) {
                // Previous mover took the last stone
                (0, true) => -HIGHEST,
                (0, false) => HIGHEST,
                _ => 0.0,
            }
        }

        fn terminal(&self, state: &Heap) -> bool {
            state.stones == 0
        }

        fn maximizing(&self, state: &Heap) -> bool {
            state.first
        }

        fn actions(&self, state: &Heap) -> Vec<u8> {
            (1..=2).filter(|take| *take <= state.stones).collect()
        }

        fn result(&self, state: &Heap, take: u8) -> Result<Heap, Infallible> {
            Ok(Heap {
                stones: state.stones - take,
                first: !state.first,
            })
        }

        fn hash(&self, state: &Heap) -> u64 {
            ((state.stones as u64) << 1) | state.first as u64
        }
    }

    fn heap(stones: u8) -> Heap {
        Heap {
            stones,
            first: true,
        }
    }

    #[test]
    fn searches_agree() {
        for stones in 1..=9 {
            let state = heap(stones);
            let expected = if stones % 3 == 0 { -HIGHEST } else { HIGHEST };

            let plain = minimax(&Nim, &state, 12).unwrap();
            let pruned = alpha_beta(&Nim, &state, 12, -HIGHEST, HIGHEST).unwrap();
            let mut searcher = Searcher::new(Nim, 64);
            let cached = searcher.search(&state, 12).unwrap();

            assert_eq!(plain.value, expected, "{stones} stones");
            assert_eq!(pruned.value, expected, "{stones} stones");
            assert_eq!(cached.value, expected, "{stones} stones");
            if expected == HIGHEST {
                // Winning move leaves a multiple of three
                assert_eq!(plain.action, Some(stones % 3));
                assert_eq!(cached.action, Some(stones % 3));
            }
        }
    }

    #[test]
    fn depth_bound() {
        // Nothing decided within one move of a large heap
        assert_eq!(minimax(&Nim, &heap(9), 1).unwrap().value, 0.0);
        // Terminal at the root
        let result = minimax(&Nim, &heap(0), 4).unwrap();
        assert_eq!(result.action, None);
        assert_eq!(result.value, -HIGHEST);
    }

    #[test]
    fn table_answers_repeated_search() {
        let mut searcher = Searcher::new(Nim, 64);
        let first = searcher.search(&heap(12), 14).unwrap();
        assert!(searcher.nodes() > 1);
        assert!(!searcher.table().is_empty());

        let second = searcher.search(&heap(12), 14).unwrap();
        assert_eq!(searcher.nodes(), 1);
        assert_eq!(second.value, first.value);
        assert_eq!(second.value, -HIGHEST);
    }

    #[test]
    fn iterative_deepening_stops_on_saturation() {
        let mut searcher = Searcher::new(Nim, 64);
        let result = searcher
            .iterative_deepening(&heap(4), 1, 10, None)
            .unwrap();
        assert_eq!(result.value, HIGHEST);
        assert_eq!(result.action, Some(1));

        // A spent budget still yields the first depth
        let result = searcher
            .iterative_deepening(&heap(9), 1, 30, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(result.value, 0.0);
        assert!(result.action.is_some());
    }

    #[test]
    fn adaptive_depth_is_clamped() {
        assert_eq!(adaptive_depth(0.0, 2, 6), 2);
        assert_eq!(adaptive_depth(0.5, 2, 6), 5);
        assert_eq!(adaptive_depth(1.0, 2, 6), 6);
        assert_eq!(adaptive_depth(-1.0, 2, 6), 2);
    }
}
