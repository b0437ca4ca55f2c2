//! Game Logic Module
//!
//! The Board Engine. Pure board algebra, no I/O.
//!
//! ## Module Structure
//!
//! - `state`: Board, phase, snapshot
//! - `moves`: Direction and the per-line slide/merge
//! - `engine`: The stateful engine (spawn, move, win/lose)
//! - `events`: What a move did, for logging

pub mod state;
pub mod moves;
pub mod engine;
pub mod events;

// Re-export key types
pub use state::{Board, GameSnapshot, Phase, BOARD_SIZE, WIN_TILE};
pub use moves::{Direction, slide_line, LineSlide};
pub use engine::{GameEngine, MoveResult, EngineError};
pub use events::GameEvent;
