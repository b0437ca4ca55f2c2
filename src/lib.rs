//! # Twenty48 Panel
//!
//! A 2048 game engine with validated save states and a message-driven
//! controller for an embedded rendering surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TWENTY48 PANEL                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Deterministic primitives                │
//! │  ├── rng.rs        - Seeded Xorshift128+ PRNG                │
//! │  ├── hash.rs       - Snapshot fingerprints                   │
//! │  └── clock.rs      - Injectable wall clock                   │
//! │                                                              │
//! │  game/             - Board engine (no I/O)                   │
//! │  ├── state.rs      - Board, phase, snapshot                  │
//! │  ├── moves.rs      - Slide and merge                         │
//! │  ├── engine.rs     - Spawn, move, win/lose                   │
//! │  └── events.rs     - What a move did                         │
//! │                                                              │
//! │  persistence/      - Save states                             │
//! │  ├── envelope.rs   - Versioned save envelope                 │
//! │  ├── validation.rs - Structure and integrity checks          │
//! │  └── store.rs      - Key-value stores                        │
//! │                                                              │
//! │  network/          - Messaging (non-deterministic)           │
//! │  ├── protocol.rs   - Message types and validators            │
//! │  ├── outbox.rs     - Delivery with retry                     │
//! │  ├── controller.rs - Game controller                         │
//! │  └── server.rs     - WebSocket host                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/` and `game/` read no clock and no global RNG. Given the same
//! seed, start time and moves, the engine produces the same boards.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod persistence;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::{Board, Direction, GameEngine, GameSnapshot, Phase};
pub use persistence::{serialize, deserialize, create_fallback, DecodeError};
pub use network::{GameController, ControllerConfig, GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
