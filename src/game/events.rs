//! Game Events
//!
//! What a single move did to the board, in the order it happened.

use serde::{Serialize, Deserialize};

use crate::game::state::Phase;

/// One observable effect of a move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// Two tiles merged into `value` at (row, col).
    TilesMerged {
        /// Row of the merged tile.
        row: usize,
        /// Column of the merged tile.
        col: usize,
        /// Merged value.
        value: u32,
    },

    /// A new tile appeared.
    TileSpawned {
        /// Row it landed in.
        row: usize,
        /// Column it landed in.
        col: usize,
        /// 2 or 4.
        value: u32,
    },

    /// Phase left `Playing`.
    PhaseChanged {
        /// Phase before the move.
        from: Phase,
        /// Phase after the move.
        to: Phase,
    },
}

impl GameEvent {
    /// Is this a phase transition?
    pub fn is_phase_change(&self) -> bool {
        matches!(self, GameEvent::PhaseChanged { .. })
    }
}
