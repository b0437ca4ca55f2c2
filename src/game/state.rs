//! Game State Definitions
//!
//! The 4x4 board, the game phase, and the transportable snapshot.

use serde::{Serialize, Deserialize};

use crate::core::hash::{StateHash, StateHasher};
use crate::game::moves::Direction;

/// Board edge length.
pub const BOARD_SIZE: usize = 4;

/// Tile value that wins the game.
pub const WIN_TILE: u32 = 2048;

/// True if `value` may appear as a tile: a power of two, at least 2.
#[inline]
pub fn is_tile_value(value: u32) -> bool {
    value >= 2 && value.is_power_of_two()
}

// =============================================================================
// BOARD
// =============================================================================

/// Fixed 4x4 grid, row-major. `0` is an empty cell.
///
/// Serializes as a plain array of four 4-element rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board(pub [[u32; BOARD_SIZE]; BOARD_SIZE]);

impl Board {
    /// A board with every cell empty.
    pub const EMPTY: Board = Board([[0; BOARD_SIZE]; BOARD_SIZE]);

    /// Create from rows.
    pub const fn from_rows(rows: [[u32; BOARD_SIZE]; BOARD_SIZE]) -> Self {
        Self(rows)
    }

    /// Borrow the rows.
    #[inline]
    pub fn rows(&self) -> &[[u32; BOARD_SIZE]; BOARD_SIZE] {
        &self.0
    }

    /// Value at (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.0[row][col]
    }

    /// Overwrite (row, col).
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: u32) {
        self.0[row][col] = value;
    }

    /// Iterate `(row, col, value)` over every cell.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, u32)> + '_ {
        self.0.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().map(move |(c, &value)| (r, c, value))
        })
    }

    /// Coordinates of all empty cells, row-major.
    pub fn empty_cells(&self) -> Vec<(usize, usize)> {
        self.cells()
            .filter(|&(_, _, value)| value == 0)
            .map(|(r, c, _)| (r, c))
            .collect()
    }

    /// Number of empty cells.
    pub fn empty_count(&self) -> usize {
        self.cells().filter(|&(_, _, value)| value == 0).count()
    }

    /// No empty cell left.
    pub fn is_full(&self) -> bool {
        self.empty_count() == 0
    }

    /// Any cell holds exactly `value`.
    pub fn contains(&self, value: u32) -> bool {
        self.cells().any(|(_, _, v)| v == value)
    }

    /// Largest value on the board (0 for an empty board).
    pub fn max_tile(&self) -> u32 {
        self.cells().map(|(_, _, v)| v).max().unwrap_or(0)
    }

    /// Sum of all cells.
    pub fn tile_sum(&self) -> u64 {
        self.cells().map(|(_, _, v)| v as u64).sum()
    }

    /// Two horizontally or vertically adjacent non-empty cells hold the same value.
    pub fn has_adjacent_pair(&self) -> bool {
        for r in 0..BOARD_SIZE {
            for c in 0..BOARD_SIZE {
                let value = self.0[r][c];
                if value == 0 {
                    continue;
                }
                if c + 1 < BOARD_SIZE && self.0[r][c + 1] == value {
                    return true;
                }
                if r + 1 < BOARD_SIZE && self.0[r + 1][c] == value {
                    return true;
                }
            }
        }
        false
    }

    /// At least one move would change the board.
    pub fn has_available_moves(&self) -> bool {
        !self.is_full() || self.has_adjacent_pair()
    }

    /// Board coordinates of `position` within line `index`, in the
    /// traversal order used when sliding toward `direction`.
    #[inline]
    pub fn line_cell(direction: Direction, index: usize, position: usize) -> (usize, usize) {
        let last = BOARD_SIZE - 1;
        match direction {
            Direction::Left => (index, position),
            Direction::Right => (index, last - position),
            Direction::Up => (position, index),
            Direction::Down => (last - position, index),
        }
    }

    /// Extract line `index` in traversal order for `direction`.
    pub fn line(&self, direction: Direction, index: usize) -> [u32; BOARD_SIZE] {
        let mut line = [0; BOARD_SIZE];
        for (position, slot) in line.iter_mut().enumerate() {
            let (r, c) = Self::line_cell(direction, index, position);
            *slot = self.0[r][c];
        }
        line
    }

    /// Write line `index` back, undoing the traversal order for `direction`.
    pub fn set_line(&mut self, direction: Direction, index: usize, line: [u32; BOARD_SIZE]) {
        for (position, value) in line.into_iter().enumerate() {
            let (r, c) = Self::line_cell(direction, index, position);
            self.0[r][c] = value;
        }
    }
}

// =============================================================================
// PHASE
// =============================================================================

/// Game phase. `Won` and `Lost` are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Moves are accepted.
    #[default]
    Playing,
    /// A 2048 tile was reached.
    Won,
    /// Board full with no merges left.
    Lost,
}

impl Phase {
    /// Wire literal.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Playing => "playing",
            Phase::Won => "won",
            Phase::Lost => "lost",
        }
    }

    /// Parse a wire literal.
    pub fn parse(s: &str) -> Option<Phase> {
        match s {
            "playing" => Some(Phase::Playing),
            "won" => Some(Phase::Won),
            "lost" => Some(Phase::Lost),
            _ => None,
        }
    }

    /// Won or Lost.
    #[inline]
    pub fn is_terminal(self) -> bool {
        self != Phase::Playing
    }

    /// Fingerprint tag.
    fn tag(self) -> u8 {
        match self {
            Phase::Playing => 0,
            Phase::Won => 1,
            Phase::Lost => 2,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase a `Playing` game moves to for `board`: won if a 2048 tile is
/// present, lost if the board is full with no adjacent pair, else playing.
pub fn classify(board: &Board) -> Phase {
    if board.contains(WIN_TILE) {
        Phase::Won
    } else if !board.has_available_moves() {
        Phase::Lost
    } else {
        Phase::Playing
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Complete state of one game session at a point in time.
///
/// Field names on the wire: `board`, `score`, `gameState`, `moveCount`,
/// `startTime`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Board cells.
    pub board: Board,
    /// Accumulated merge score.
    pub score: u64,
    /// Current phase.
    #[serde(rename = "gameState")]
    pub phase: Phase,
    /// Successful moves so far.
    pub move_count: u64,
    /// Game start, epoch milliseconds.
    #[serde(rename = "startTime")]
    pub started_at_ms: i64,
}

impl GameSnapshot {
    /// Fresh empty-board snapshot in the `Playing` phase.
    pub fn empty(started_at_ms: i64) -> Self {
        Self {
            board: Board::EMPTY,
            score: 0,
            phase: Phase::Playing,
            move_count: 0,
            started_at_ms,
        }
    }

    /// Deterministic fingerprint of every field.
    pub fn fingerprint(&self) -> StateHash {
        let mut hasher = StateHasher::for_snapshot();
        for (_, _, value) in self.board.cells() {
            hasher.update_u32(value);
        }
        hasher.update_u64(self.score);
        hasher.update_u8(self.phase.tag());
        hasher.update_u64(self.move_count);
        hasher.update_i64(self.started_at_ms);
        hasher.finalize()
    }
}

// =============================================================================
// TESTS
// =============================================================================
