//! Board Engine
//!
//! Owns the authoritative board for one session. No I/O: time comes in
//! as a parameter and randomness from the engine's own seeded RNG.

use crate::core::rng::DeterministicRng;
use crate::game::events::GameEvent;
use crate::game::moves::{slide_line, Direction};
use crate::game::state::{classify, is_tile_value, Board, GameSnapshot, Phase, BOARD_SIZE};

/// Probability of a spawned tile being a 4, as (numerator, denominator).
pub const FOUR_TILE_CHANCE: (u32, u32) = (1, 10);

/// Tiles placed by [`GameEngine::initialize`].
pub const OPENING_TILES: usize = 2;

/// Engine construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The freshly initialized board failed its self-check.
    #[error("invalid opening board: {0}")]
    InvalidOpening(String),
}

/// Outcome of [`GameEngine::apply_move`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MoveResult {
    /// At least one line changed.
    pub moved: bool,
    /// Score gained from merges.
    pub score_delta: u64,
    /// Merges, the spawned tile, and any phase change, in order.
    pub events: Vec<GameEvent>,
}

/// The 2048 board engine.
#[derive(Clone, Debug)]
pub struct GameEngine {
    board: Board,
    score: u64,
    phase: Phase,
    move_count: u64,
    started_at_ms: i64,
    rng: DeterministicRng,
}

impl GameEngine {
    /// Create an engine with an empty board. Call [`initialize`](Self::initialize)
    /// or [`hydrate`](Self::hydrate) before playing.
    pub fn new(seed: u64) -> Self {
        Self {
            board: Board::EMPTY,
            score: 0,
            phase: Phase::Playing,
            move_count: 0,
            started_at_ms: 0,
            rng: DeterministicRng::new(seed),
        }
    }

    /// Create and initialize an engine, checking the opening board.
    pub fn started(seed: u64, now_ms: i64) -> Result<Self, EngineError> {
        let mut engine = Self::new(seed);
        engine.initialize(now_ms);

        let tiles: Vec<u32> = engine.board.cells()
            .map(|(_, _, v)| v)
            .filter(|&v| v != 0)
            .collect();
        if tiles.len() != OPENING_TILES {
            return Err(EngineError::InvalidOpening(format!(
                "expected {} tiles, found {}", OPENING_TILES, tiles.len()
            )));
        }
        if let Some(bad) = tiles.iter().find(|&&v| v != 2 && v != 4) {
            return Err(EngineError::InvalidOpening(format!("unexpected tile {}", bad)));
        }

        Ok(engine)
    }

    /// Reset to a fresh game started at `now_ms` with two random tiles.
    pub fn initialize(&mut self, now_ms: i64) {
        self.board = Board::EMPTY;
        self.score = 0;
        self.move_count = 0;
        self.phase = Phase::Playing;
        self.started_at_ms = now_ms;
        for _ in 0..OPENING_TILES {
            self.spawn_random_tile();
        }
    }

    /// Place a 2 (90%) or 4 (10%) on a uniformly chosen empty cell.
    ///
    /// Returns false, without touching the board, if no cell is empty.
    pub fn spawn_random_tile(&mut self) -> bool {
        self.spawn_tile().is_some()
    }

    fn spawn_tile(&mut self) -> Option<GameEvent> {
        let empty = self.board.empty_cells();
        let &(row, col) = self.rng.choose(&empty)?;
        let (numerator, denominator) = FOUR_TILE_CHANCE;
        let value = if self.rng.chance(numerator, denominator) { 4 } else { 2 };
        self.board.set(row, col, value);
        Some(GameEvent::TileSpawned { row, col, value })
    }

    /// Slide every line of `board` toward `direction`.
    ///
    /// Returns the new board, the score gained and merge events.
    pub fn slide_board(board: &Board, direction: Direction) -> (Board, u64, Vec<GameEvent>) {
        let mut next = *board;
        let mut score_delta = 0u64;
        let mut events = Vec::new();

        for index in 0..BOARD_SIZE {
            let slide = slide_line(board.line(direction, index));
            for (position, value) in slide.merged_values() {
                let (row, col) = Board::line_cell(direction, index, position);
                events.push(GameEvent::TilesMerged { row, col, value });
            }
            score_delta += slide.score_delta;
            next.set_line(direction, index, slide.line);
        }

        (next, score_delta, events)
    }

    /// Would a move toward `direction` change the board?
    pub fn can_move(&self, direction: Direction) -> bool {
        Self::slide_board(&self.board, direction).0 != self.board
    }

    /// Apply one move.
    ///
    /// If nothing changes, state is left untouched and `moved` is false.
    /// Otherwise the move counter advances, one tile spawns and the phase
    /// is re-evaluated. Does not check the phase; callers gate terminal games.
    pub fn apply_move(&mut self, direction: Direction) -> MoveResult {
        let (next, score_delta, mut events) = Self::slide_board(&self.board, direction);
        if next == self.board {
            return MoveResult::default();
        }

        self.board = next;
        self.score = self.score.saturating_add(score_delta);
        self.move_count += 1;

        if let Some(spawned) = self.spawn_tile() {
            events.push(spawned);
        }
        if let Some(changed) = self.update_status() {
            events.push(changed);
        }

        MoveResult {
            moved: true,
            score_delta,
            events,
        }
    }

    /// Re-evaluate the phase. Only a `Playing` game can change:
    /// to `Won` on a 2048 tile, to `Lost` when no move is left.
    ///
    /// Returns the transition event, if any.
    pub fn update_status(&mut self) -> Option<GameEvent> {
        if self.phase != Phase::Playing {
            return None;
        }
        let next = classify(&self.board);
        if next == self.phase {
            return None;
        }
        let from = self.phase;
        self.phase = next;
        Some(GameEvent::PhaseChanged { from, to: next })
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            board: self.board,
            score: self.score,
            phase: self.phase,
            move_count: self.move_count,
            started_at_ms: self.started_at_ms,
        }
    }

    /// Overwrite all state from `snapshot`. No validation happens here.
    pub fn hydrate(&mut self, snapshot: &GameSnapshot) {
        self.board = snapshot.board;
        self.score = snapshot.score;
        self.phase = snapshot.phase;
        self.move_count = snapshot.move_count;
        self.started_at_ms = snapshot.started_at_ms;
    }

    /// Borrow the board.
    #[inline]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Current score.
    #[inline]
    pub fn score(&self) -> u64 {
        self.score
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Successful moves so far.
    #[inline]
    pub fn move_count(&self) -> u64 {
        self.move_count
    }

    /// Game start, epoch milliseconds.
    #[inline]
    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    /// Any direction would change the board.
    pub fn has_available_moves(&self) -> bool {
        self.board.has_available_moves()
    }

    /// Every non-zero cell is a legal tile value.
    pub fn board_is_well_formed(&self) -> bool {
        self.board.cells().all(|(_, _, v)| v == 0 || is_tile_value(v))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::WIN_TILE;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000_000;

    fn engine_with(rows: [[u32; 4]; 4]) -> GameEngine {
        let mut engine = GameEngine::new(7);
        engine.hydrate(&GameSnapshot {
            board: Board::from_rows(rows),
            score: 0,
            phase: Phase::Playing,
            move_count: 0,
            started_at_ms: NOW,
        });
        engine
    }

    fn checkerboard() -> [[u32; 4]; 4] {
        [
            [2, 4, 2, 4],
            [4, 2, 4, 2],
            [2, 4, 2, 4],
            [4, 2, 4, 2],
        ]
    }

    #[test]
    fn test_initialize_places_two_tiles() {
        let engine = GameEngine::started(99, NOW).unwrap();
        assert_eq!(engine.board().empty_count(), 14);
        assert_eq!(engine.score(), 0);
        assert_eq!(engine.move_count(), 0);
        assert_eq!(engine.phase(), Phase::Playing);
        assert_eq!(engine.started_at_ms(), NOW);
        assert!(engine.board_is_well_formed());
    }

    #[test]
    fn test_initialize_resets_previous_game() {
        let mut engine = engine_with([[1024, 1024, 0, 0], [0; 4], [0; 4], [0; 4]]);
        engine.apply_move(Direction::Left);
        assert_eq!(engine.phase(), Phase::Won);

        engine.initialize(NOW + 5);
        assert_eq!(engine.phase(), Phase::Playing);
        assert_eq!(engine.score(), 0);
        assert_eq!(engine.move_count(), 0);
        assert_eq!(engine.started_at_ms(), NOW + 5);
        assert_eq!(engine.board().empty_count(), 14);
    }

    #[test]
    fn test_same_seed_same_game() {
        let mut a = GameEngine::started(1234, NOW).unwrap();
        let mut b = GameEngine::started(1234, NOW).unwrap();
        for direction in [Direction::Left, Direction::Up, Direction::Right, Direction::Down] {
            a.apply_move(direction);
            b.apply_move(direction);
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_empty_board_move_is_noop() {
        let mut engine = GameEngine::new(1);
        let result = engine.apply_move(Direction::Left);
        assert!(!result.moved);
        assert_eq!(engine.move_count(), 0);
        assert_eq!(engine.board(), &Board::EMPTY);
    }

    #[test]
    fn test_row_merge_left() {
        let mut engine = engine_with([[2, 2, 4, 4], [0; 4], [0; 4], [0; 4]]);
        let result = engine.apply_move(Direction::Left);

        assert!(result.moved);
        assert_eq!(result.score_delta, 12);
        assert_eq!(engine.score(), 12);
        assert_eq!(engine.move_count(), 1);
        assert_eq!(&engine.board().rows()[0][..2], &[4, 8]);
        // exactly one tile spawned somewhere else
        assert_eq!(engine.board().empty_count(), 16 - 3);
    }

    #[test]
    fn test_four_twos_merge_pairwise() {
        let mut engine = engine_with([[2, 2, 2, 2], [0; 4], [0; 4], [0; 4]]);
        let result = engine.apply_move(Direction::Left);
        assert_eq!(result.score_delta, 8);
        assert_eq!(&engine.board().rows()[0][..2], &[4, 4]);
    }

    #[test]
    fn test_row_merge_right_and_column_moves() {
        let mut engine = engine_with([[2, 2, 4, 4], [0; 4], [0; 4], [0; 4]]);
        let (board, delta, _) = GameEngine::slide_board(engine.board(), Direction::Right);
        assert_eq!(board.rows()[0], [0, 0, 4, 8]);
        assert_eq!(delta, 12);

        engine = engine_with([[2, 0, 0, 0], [2, 0, 0, 0], [4, 0, 0, 0], [4, 0, 0, 0]]);
        let (up, _, _) = GameEngine::slide_board(engine.board(), Direction::Up);
        assert_eq!([up.get(0, 0), up.get(1, 0), up.get(2, 0), up.get(3, 0)], [4, 8, 0, 0]);
        let (down, _, _) = GameEngine::slide_board(engine.board(), Direction::Down);
        assert_eq!([down.get(0, 0), down.get(1, 0), down.get(2, 0), down.get(3, 0)], [0, 0, 4, 8]);
    }

    #[test]
    fn test_merge_events_report_board_coordinates() {
        let engine = engine_with([[0, 0, 2, 2], [0; 4], [0; 4], [0; 4]]);
        let (_, _, events) = GameEngine::slide_board(engine.board(), Direction::Right);
        assert_eq!(events, vec![GameEvent::TilesMerged { row: 0, col: 3, value: 4 }]);
    }

    #[test]
    fn test_reaching_2048_wins() {
        let mut engine = engine_with([[1024, 1024, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let result = engine.apply_move(Direction::Left);
        assert!(result.moved);
        assert_eq!(engine.phase(), Phase::Won);
        assert!(engine.board().contains(WIN_TILE));
        assert!(result.events.contains(&GameEvent::PhaseChanged {
            from: Phase::Playing,
            to: Phase::Won,
        }));
    }

    #[test]
    fn test_checkerboard_is_stuck() {
        let mut engine = engine_with(checkerboard());
        assert!(!engine.has_available_moves());
        let before = engine.snapshot();
        for direction in Direction::ALL {
            assert!(!engine.can_move(direction));
            assert!(!engine.apply_move(direction).moved);
        }
        assert_eq!(engine.snapshot(), before);

        engine.update_status();
        assert_eq!(engine.phase(), Phase::Lost);
    }

    #[test]
    fn test_terminal_phase_is_sticky() {
        let mut engine = engine_with([[1024, 1024, 0, 0], [0; 4], [0; 4], [0; 4]]);
        engine.apply_move(Direction::Left);
        assert_eq!(engine.phase(), Phase::Won);

        // Drop the 2048 tile from the board; phase must not revert
        let mut snapshot = engine.snapshot();
        snapshot.board = Board::from_rows(checkerboard());
        engine.hydrate(&snapshot);
        assert!(engine.update_status().is_none());
        assert_eq!(engine.phase(), Phase::Won);
    }

    #[test]
    fn test_spawn_on_full_board_fails() {
        let mut engine = engine_with(checkerboard());
        assert!(!engine.spawn_random_tile());
        assert_eq!(engine.board(), &Board::from_rows(checkerboard()));
    }

    #[test]
    fn test_spawn_values() {
        let mut engine = GameEngine::new(31337);
        let mut fours = 0;
        for _ in 0..500 {
            engine.hydrate(&GameSnapshot::empty(NOW));
            assert!(engine.spawn_random_tile());
            let value = engine.board().max_tile();
            assert!(value == 2 || value == 4);
            if value == 4 {
                fours += 1;
            }
        }
        assert!(fours > 10 && fours < 120, "fours = {}", fours);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let engine = engine_with([[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let mut snapshot = engine.snapshot();
        snapshot.board.set(0, 0, 4096);
        snapshot.score = 99;
        assert_eq!(engine.board().get(0, 0), 2);
        assert_eq!(engine.score(), 0);
    }

    #[test]
    fn test_hydrate_overwrites_everything() {
        let mut engine = GameEngine::started(5, NOW).unwrap();
        let snapshot = GameSnapshot {
            board: Board::from_rows([[8, 0, 0, 0], [0; 4], [0; 4], [0, 0, 0, 16]]),
            score: 1000,
            phase: Phase::Lost,
            move_count: 77,
            started_at_ms: NOW - 10,
        };
        engine.hydrate(&snapshot);
        assert_eq!(engine.snapshot(), snapshot);
    }

    proptest! {
        #[test]
        fn prop_reachable_boards_stay_well_formed(
            seed in any::<u64>(),
            moves in prop::collection::vec(0usize..4, 0..200),
        ) {
            let mut engine = GameEngine::started(seed, NOW).unwrap();
            let mut was_terminal = false;
            let mut last_phase = engine.phase();
            for m in moves {
                let before = engine.snapshot();
                let result = engine.apply_move(Direction::ALL[m]);

                prop_assert!(engine.board_is_well_formed());
                if result.moved {
                    prop_assert_eq!(engine.move_count(), before.move_count + 1);
                    prop_assert_eq!(engine.score(), before.score + result.score_delta);
                } else {
                    prop_assert_eq!(engine.snapshot(), before);
                }

                if was_terminal {
                    prop_assert_eq!(engine.phase(), last_phase);
                }
                was_terminal = engine.phase().is_terminal();
                last_phase = engine.phase();
            }
        }
    }
}
