//! Snapshot Validation
//!
//! Two gates, both collecting every violation rather than stopping at
//! the first:
//!
//! - **structure** runs on untyped JSON and checks shape and field types.
//! - **integrity** runs on a typed snapshot and checks that it is a
//!   plausible game: legal tiles, sane start time, phase consistent
//!   with the board.

use serde_json::Value;

use crate::game::state::{is_tile_value, Board, GameSnapshot, Phase, BOARD_SIZE, WIN_TILE};

/// Oldest accepted game start, relative to now.
pub const MAX_SNAPSHOT_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Collected rule violations. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// One human-readable line per violated rule.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// No rule was violated.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record a violation.
    pub fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// All violations joined with `"; "`.
    pub fn joined(&self) -> String {
        self.errors.join("; ")
    }

    /// Convert into `Ok(())` or the list of violations.
    pub fn into_result(self) -> Result<(), Vec<String>> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Check that `candidate` has the shape of a serialized snapshot.
///
/// Expects an object with `board` (4 rows of 4 non-negative integers),
/// non-negative integer `score` and `moveCount`, `gameState` one of
/// `playing`/`won`/`lost`, and a positive integer `startTime`.
pub fn validate_structure(candidate: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(object) = candidate.as_object() else {
        report.push("State must be an object");
        return report;
    };

    match object.get("board").and_then(Value::as_array) {
        None => report.push("Board must be an array"),
        Some(rows) => {
            if rows.len() != BOARD_SIZE {
                report.push(format!("Board must have exactly {} rows", BOARD_SIZE));
            }
            for (r, row) in rows.iter().enumerate() {
                let Some(cells) = row.as_array() else {
                    report.push(format!("Row {} must be an array", r));
                    continue;
                };
                if cells.len() != BOARD_SIZE {
                    report.push(format!("Row {} must have exactly {} columns", r, BOARD_SIZE));
                }
                for (c, cell) in cells.iter().enumerate() {
                    if !is_cell_number(cell) {
                        report.push(format!("Invalid cell value at [{}][{}]", r, c));
                    }
                }
            }
        }
    }

    if object.get("score").and_then(Value::as_u64).is_none() {
        report.push("Score must be a non-negative integer");
    }

    let phase = object.get("gameState").and_then(Value::as_str).and_then(Phase::parse);
    if phase.is_none() {
        report.push("Game state must be one of playing, won, lost");
    }

    if object.get("moveCount").and_then(Value::as_u64).is_none() {
        report.push("Move count must be a non-negative integer");
    }

    match object.get("startTime").and_then(Value::as_i64) {
        Some(t) if t > 0 => {}
        _ => report.push("Start time must be a positive timestamp"),
    }

    report
}

fn is_cell_number(cell: &Value) -> bool {
    cell.as_u64().is_some_and(|v| v <= u32::MAX as u64)
}

/// Check that a structurally valid snapshot describes a plausible game
/// as of `now_ms`.
pub fn validate_integrity(snapshot: &GameSnapshot, now_ms: i64) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (r, c, value) in snapshot.board.cells() {
        if value != 0 && !is_tile_value(value) {
            report.push(format!("Invalid tile value {} at [{}][{}]", value, r, c));
        }
    }

    if snapshot.started_at_ms > now_ms {
        report.push("Start time is in the future");
    }
    if now_ms.saturating_sub(snapshot.started_at_ms) > MAX_SNAPSHOT_AGE_MS {
        report.push("Start time is more than 7 days old");
    }

    if snapshot.score < minimum_score_for(&snapshot.board) {
        report.push("Score is lower than the board allows");
    }

    match snapshot.phase {
        Phase::Won if !snapshot.board.contains(WIN_TILE) => {
            report.push("Game marked as won without a 2048 tile");
        }
        Phase::Lost if snapshot.board.empty_count() > 0 => {
            report.push("Game marked as lost with empty cells");
        }
        _ => {}
    }

    report
}

/// Lower bound on the score a board implies.
///
/// Always 0: the score rule is kept as an always-pass check until a real
/// bound is agreed on. Spawned 4s make a tight bound non-trivial.
fn minimum_score_for(_board: &Board) -> u64 {
    0
}
