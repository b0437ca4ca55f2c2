//! Persistence
//!
//! Save-state serialization and the store it is written to. The
//! serializer knows nothing about storage; the store knows nothing
//! about game state.

pub mod envelope;
pub mod validation;
pub mod store;

pub use envelope::{
    serialize, deserialize, create_fallback, Decoded, DecodeError, EncodeError,
    SaveEnvelope, SAVE_HEADER, SAVE_FORMAT_VERSION,
};
pub use validation::{validate_structure, validate_integrity, ValidationReport, MAX_SNAPSHOT_AGE_MS};
pub use store::{KeyValueStore, MemoryStore, FileStore, StoreError};
