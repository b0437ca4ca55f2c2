//! Core deterministic primitives.
//!
//! Randomness, hashing and time. Everything above this layer takes
//! these as explicit inputs.

pub mod rng;
pub mod hash;
pub mod clock;

// Re-export core types
pub use rng::DeterministicRng;
pub use hash::{StateHash, StateHasher};
pub use clock::{Clock, SystemClock, ManualClock};
