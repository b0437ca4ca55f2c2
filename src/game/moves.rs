//! Slide and Merge
//!
//! Pure per-line algorithm. A line is one row (Left/Right) or one
//! column (Up/Down) read in the direction tiles travel, so every move
//! reduces to sliding toward index 0.

use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::game::state::BOARD_SIZE;

/// Move direction. Wire literals: `up`, `down`, `left`, `right`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward row 0.
    Up,
    /// Toward row 3.
    Down,
    /// Toward column 0.
    Left,
    /// Toward column 3.
    Right,
}

impl Direction {
    /// All four directions.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Wire literal.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    /// Parse a wire literal. Anything but the four literals is `None`.
    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }
}

impl FromStr for Direction {
    type Err = InvalidDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::parse(s).ok_or_else(|| InvalidDirection(s.to_string()))
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected direction literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid direction {0:?}, expected one of up, down, left, right")]
pub struct InvalidDirection(pub String);

/// Result of sliding one line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSlide {
    /// Line after compaction, merge and padding.
    pub line: [u32; BOARD_SIZE],
    /// Sum of tiles produced by merges.
    pub score_delta: u64,
    /// Positions in `line` holding a freshly merged tile.
    pub merged: [bool; BOARD_SIZE],
}

impl LineSlide {
    /// Tiles produced by merges, in line order.
    pub fn merged_values(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.merged
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(|(i, _)| (i, self.line[i]))
    }
}

/// Slide `line` toward index 0 and merge equal neighbours.
///
/// Zeros are dropped, then a single forward scan merges each equal pair
/// once: `[2, 2, 2, 2]` becomes `[4, 4, 0, 0]`, never `[8, 0, 0, 0]`.
/// A pair whose sum would overflow `u32` stays unmerged.
pub fn slide_line(line: [u32; BOARD_SIZE]) -> LineSlide {
    let mut dense = [0u32; BOARD_SIZE];
    let mut len = 0;
    for value in line {
        if value != 0 {
            dense[len] = value;
            len += 1;
        }
    }

    let mut out = LineSlide {
        line: [0; BOARD_SIZE],
        score_delta: 0,
        merged: [false; BOARD_SIZE],
    };

    let mut write = 0;
    let mut i = 0;
    while i < len {
        let value = dense[i];
        let doubled = if i + 1 < len && dense[i + 1] == value {
            value.checked_mul(2)
        } else {
            None
        };

        match doubled {
            Some(merged) => {
                out.line[write] = merged;
                out.merged[write] = true;
                out.score_delta += merged as u64;
                i += 2;
            }
            None => {
                out.line[write] = value;
                i += 1;
            }
        }
        write += 1;
    }

    out
}
