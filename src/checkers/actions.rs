use std::{collections::BTreeSet, fmt::Display};

use serde::{Deserialize, Serialize};

use super::{
    Rules, State, StateError,
    board::{Board, Pos, Side},
    piece::{PieceType, Player},
};

/// Atomic unit of play: a piece travels from one cell to another,
/// capturing along the way when the action is a jump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub from: Pos,
    pub to: Pos,
}

impl Action {
    pub const fn new(from: Pos, to: Pos) -> Self {
        Self { from, to }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Reachable jump ends in discovery order, each with the ordered list of captured cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jumps(Vec<(Pos, Vec<Pos>)>);

impl Jumps {
    /// Captured cells on the way to `end`
    pub fn get(&self, end: Pos) -> Option<&[Pos]> {
        self.0
            .iter()
            .find(|(pos, _)| *pos == end)
            .map(|(_, captured)| captured.as_slice())
    }

    pub fn contains(&self, end: Pos) -> bool {
        self.get(end).is_some()
    }

    /// Records a path to `end` unless one was already discovered
    fn insert_first(&mut self, end: Pos, captured: &[Pos]) {
        if !self.contains(end) {
            self.0.push((end, captured.to_vec()));
        }
    }

    pub fn ends(&self) -> impl Iterator<Item = Pos> + '_ {
        self.0.iter().map(|(end, _)| *end)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pos, &[Pos])> {
        self.0
            .iter()
            .map(|(end, captured)| (*end, captured.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a single piece can do this turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet {
    jumps: Jumps,
    moves: Vec<Pos>,
    ends: BTreeSet<Pos>,
}

impl ActionSet {
    pub fn new(jumps: Jumps, moves: Vec<Pos>) -> Self {
        let ends = jumps.ends().chain(moves.iter().copied()).collect();
        Self { jumps, moves, ends }
    }

    pub fn jumps(&self) -> &Jumps {
        &self.jumps
    }

    pub fn moves(&self) -> &[Pos] {
        &self.moves
    }

    /// All reachable end cells
    pub fn ends(&self) -> &BTreeSet<Pos> {
        &self.ends
    }

    pub fn contains(&self, end: Pos) -> bool {
        self.ends.contains(&end)
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    pub fn has_jumps(&self) -> bool {
        !self.jumps.is_empty()
    }

    /// Same set with plain moves dropped
    fn jumps_only(self) -> Self {
        Self::new(self.jumps, Vec::new())
    }

    /// End cells in enumeration order: jumps first, then plain moves
    pub fn iter_ends(&self) -> impl Iterator<Item = Pos> + '_ {
        self.jumps.ends().chain(self.moves.iter().copied())
    }
}

/// Step performed while applying an action, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStep {
    /// The piece travelled from `from` to `to`
    Moved { from: Pos, to: Pos },
    /// The piece at this position was captured
    Jumped(Pos),
    /// The moving piece, now resting at `pos`, was crowned
    Kinged { pos: Pos, piece: PieceType },
}

impl State {
    /// Sides a piece may travel along.
    /// Pawns only step forward; their jumps depend on the rules.
    fn sides(rules: Rules, piece: PieceType, jumping: bool) -> impl Iterator<Item = Side> {
        let forward_only = !piece.is_king() && (!jumping || rules.pawn_jump_forward_only);
        let player = piece.player();
        Side::variants()
            .into_iter()
            .filter(move |side| !forward_only || side.is_forward_for(player))
    }

    /// Plain moves of the piece at `pos`
    pub fn moves_from(&self, pos: Pos) -> Result<Vec<Pos>, StateError> {
        let piece = self.piece(pos).ok_or(StateError::IllegalPosition(pos))?;
        Ok(self.piece_moves(pos, piece))
    }

    fn piece_moves(&self, pos: Pos, piece: PieceType) -> Vec<Pos> {
        let size = self.size();
        Self::sides(self.rules, piece, false)
            .filter_map(|side| pos.step(side, 1, size))
            .filter(|end| self.board.get(*end).is_none())
            .collect()
    }

    /// Jumps of the piece at `pos`, chained jumps included
    pub fn jumps_from(&self, pos: Pos) -> Result<Jumps, StateError> {
        let piece = self.piece(pos).ok_or(StateError::IllegalPosition(pos))?;
        Ok(self.piece_jumps(pos, piece))
    }

    fn piece_jumps(&self, pos: Pos, piece: PieceType) -> Jumps {
        // The moving piece leaves its cell for the whole chain
        let mut board = self.board.clone();
        board.take(pos);

        let mut jumps = Jumps::default();
        let mut captured = Vec::new();
        collect_jumps(
            self.rules,
            &mut board,
            pos,
            pos,
            piece,
            0,
            &mut captured,
            &mut jumps,
        );
        jumps
    }

    fn piece_actions(&self, pos: Pos, piece: PieceType) -> ActionSet {
        ActionSet::new(self.piece_jumps(pos, piece), self.piece_moves(pos, piece))
    }

    /// Unfiltered jumps and moves of the piece at `pos`
    pub fn action_set(&self, pos: Pos) -> Result<ActionSet, StateError> {
        let piece = self.piece(pos).ok_or(StateError::IllegalPosition(pos))?;
        Ok(self.piece_actions(pos, piece))
    }

    /// Action sets of every piece of `player` that has a legal action,
    /// with mandatory capture applied
    pub fn action_sets(&self, player: Player) -> Vec<(Pos, ActionSet)> {
        let sets: Vec<(Pos, ActionSet)> = self
            .board
            .iter_player_pieces(player)
            .map(|(pos, piece)| (pos, self.piece_actions(pos, piece)))
            .filter(|(_, set)| !set.is_empty())
            .collect();

        if self.rules.mandatory_capture && sets.iter().any(|(_, set)| set.has_jumps()) {
            sets.into_iter()
                .filter(|(_, set)| set.has_jumps())
                .map(|(pos, set)| (pos, set.jumps_only()))
                .collect()
        } else {
            sets
        }
    }

    /// Legal action set of the piece at `pos` for its owner
    pub fn legal_action_set(&self, pos: Pos) -> Option<ActionSet> {
        let player = self.piece(pos)?.player();
        self.action_sets(player)
            .into_iter()
            .find(|(from, _)| *from == pos)
            .map(|(_, set)| set)
    }

    /// All legal actions of `player`
    pub fn legal_actions(&self, player: Player) -> Vec<Action> {
        self.action_sets(player)
            .iter()
            .flat_map(|(from, set)| set.iter_ends().map(|to| Action::new(*from, to)))
            .collect()
    }

    /// Whether `player` has at least one legal action
    pub fn has_legal_action(&self, player: Player) -> bool {
        self.board
            .iter_player_pieces(player)
            .any(|(pos, piece)| !self.piece_actions(pos, piece).is_empty())
    }

    /// Applies an action of the player to move
    pub fn apply(&self, action: Action) -> Result<State, StateError> {
        self.apply_with(action, &mut Vec::new())
    }

    /// Applies an action of the player to move, recording every step in `steps`
    pub fn apply_with(
        &self,
        action: Action,
        steps: &mut Vec<ActionStep>,
    ) -> Result<State, StateError> {
        let player = self.player();
        let set = self
            .action_sets(player)
            .into_iter()
            .find(|(from, _)| *from == action.from)
            .map(|(_, set)| set)
            .filter(|set| set.contains(action.to))
            .ok_or(StateError::IllegalAction(action))?;

        let mut board = self.board.clone();
        let mut piece = board
            .take(action.from)
            .ok_or(StateError::IllegalPosition(action.from))?;
        let promotion_row = self.size().promotion_row(player);
        let mut kinged = false;

        steps.push(ActionStep::Moved {
            from: action.from,
            to: action.to,
        });

        match set.jumps().get(action.to) {
            Some(captured) => {
                let mut pos = action.from;
                for &victim in captured {
                    board.take(victim);
                    steps.push(ActionStep::Jumped(victim));

                    // Land two cells further, right behind the captured piece
                    pos = land_behind(pos, victim)
                        .ok_or(StateError::IllegalAction(action))?;
                    if !piece.is_king() && pos.y == promotion_row {
                        piece = piece.promoted();
                        kinged = true;
                    }
                }
                debug_assert_eq!(pos, action.to, "Jump path does not end at its target");
            }
            None => {
                if !piece.is_king() && action.to.y == promotion_row {
                    piece = piece.promoted();
                    kinged = true;
                }
            }
        }

        if kinged {
            steps.push(ActionStep::Kinged {
                pos: action.to,
                piece,
            });
        }
        board[action.to] = Some(piece);

        Ok(State {
            board,
            turn: !self.turn,
            rules: self.rules,
        })
    }
}

/// Cell reached when jumping from `from` over `over`
fn land_behind(from: Pos, over: Pos) -> Option<Pos> {
    let x = 2 * over.x as i16 - from.x as i16;
    let y = 2 * over.y as i16 - from.y as i16;
    Some(Pos::new(u8::try_from(x).ok()?, u8::try_from(y).ok()?))
}

/// Recursive capture search from `pos`.
///
/// Captured pieces are lifted off the working board before searching deeper,
/// so a piece cannot be jumped twice. Every landing cell is a valid end and
/// the first path discovered to an end wins. A pawn crowned mid-chain keeps
/// jumping as a king and the depth counter starts over.
#[allow(clippy::too_many_arguments)]
fn collect_jumps(
    rules: Rules,
    board: &mut Board,
    origin: Pos,
    pos: Pos,
    piece: PieceType,
    depth: usize,
    captured: &mut Vec<Pos>,
    jumps: &mut Jumps,
) {
    let size = board.size();
    let max_depth = size.chain_depth();

    for side in State::sides(rules, piece, true) {
        let (Some(over), Some(land)) = (pos.step(side, 1, size), pos.step(side, 2, size)) else {
            continue;
        };
        let Some(victim) = board.get(over) else {
            continue;
        };
        if !piece.is_enemy(victim) || board.get(land).is_some() {
            continue;
        }

        captured.push(over);
        if land != origin {
            jumps.insert_first(land, captured);
        }

        let (next_piece, next_depth) =
            if !piece.is_king() && land.y == size.promotion_row(piece.player()) {
                (piece.promoted(), 0)
            } else {
                (piece, depth + 1)
            };

        if next_depth < max_depth {
            board.take(over);
            collect_jumps(
                rules, board, origin, land, next_piece, next_depth, captured, jumps,
            );
            board[over] = Some(victim);
        }

        captured.pop();
    }
}
