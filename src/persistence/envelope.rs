//! Save Envelope
//!
//! Versioned, header-tagged JSON wrapper around a [`GameSnapshot`]:
//!
//! ```text
//! { "header": "TWENTY48_SAVE", "version": 1, "timestamp": <epoch-ms>,
//!   "state": { "board": [[..]x4], "score": .., "gameState": "playing",
//!              "moveCount": .., "startTime": <epoch-ms> } }
//! ```
//!
//! Decoding never panics on hostile input; every failure is a
//! [`DecodeError`] telling the caller to fall back to a new game.

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::game::state::GameSnapshot;
use crate::persistence::validation::{validate_integrity, validate_structure};

/// Magic header identifying a save written by this crate.
pub const SAVE_HEADER: &str = "TWENTY48_SAVE";

/// Current save format version. Other versions are rejected.
pub const SAVE_FORMAT_VERSION: u32 = 1;

const ENVELOPE_FIELDS: [&str; 4] = ["header", "version", "timestamp", "state"];

/// On-disk / on-wire save format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEnvelope {
    /// Always [`SAVE_HEADER`].
    pub header: String,
    /// Always [`SAVE_FORMAT_VERSION`] when written.
    pub version: u32,
    /// When the save was written, epoch milliseconds.
    pub timestamp: i64,
    /// The saved game.
    pub state: GameSnapshot,
}

/// Save encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The snapshot failed structural validation.
    #[error("refusing to save invalid state: {}", .0.join("; "))]
    InvalidState(Vec<String>),

    /// JSON encoding failed.
    #[error("failed to encode save: {0}")]
    Encoding(String),
}

/// Save decoding errors, in the order they are checked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Nothing to decode.
    #[error("saved state is empty")]
    EmptyInput,

    /// Not a JSON object.
    #[error("saved state is not a valid envelope: {0}")]
    Malformed(String),

    /// Missing or foreign header.
    #[error("unexpected save header {found:?}")]
    HeaderMismatch {
        /// Header found, if any.
        found: Option<String>,
    },

    /// Missing or unsupported version.
    #[error("unsupported save version {found:?}, expected {expected}")]
    VersionMismatch {
        /// Version found, if any.
        found: Option<i64>,
        /// Version this build reads.
        expected: u32,
    },

    /// Envelope has no `state`.
    #[error("save envelope has no state")]
    MissingState,

    /// `state` has the wrong shape.
    #[error("saved state is malformed: {}", .0.join("; "))]
    InvalidStructure(Vec<String>),

    /// `state` is well-formed but not a plausible game.
    #[error("saved state failed integrity checks: {}", .0.join("; "))]
    IntegrityViolation(Vec<String>),
}

impl DecodeError {
    /// Should the caller discard the save and start a new game?
    pub fn fallback_to_new_game(&self) -> bool {
        match self {
            DecodeError::EmptyInput
            | DecodeError::Malformed(_)
            | DecodeError::HeaderMismatch { .. }
            | DecodeError::VersionMismatch { .. }
            | DecodeError::MissingState
            | DecodeError::InvalidStructure(_)
            | DecodeError::IntegrityViolation(_) => true,
        }
    }
}

/// A successfully decoded save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The restored game.
    pub snapshot: GameSnapshot,
    /// Envelope `timestamp`, when present.
    pub saved_at_ms: Option<i64>,
    /// Non-fatal oddities (unknown fields, missing timestamp).
    pub warnings: Vec<String>,
}

/// Validate `snapshot` and wrap it in an envelope stamped `now_ms`.
pub fn serialize(snapshot: &GameSnapshot, now_ms: i64) -> Result<String, EncodeError> {
    let value = serde_json::to_value(snapshot)
        .map_err(|e| EncodeError::Encoding(e.to_string()))?;
    validate_structure(&value)
        .into_result()
        .map_err(EncodeError::InvalidState)?;

    let envelope = SaveEnvelope {
        header: SAVE_HEADER.to_string(),
        version: SAVE_FORMAT_VERSION,
        timestamp: now_ms,
        state: snapshot.clone(),
    };
    serde_json::to_string(&envelope).map_err(|e| EncodeError::Encoding(e.to_string()))
}

/// Decode and fully validate a save as of `now_ms`.
pub fn deserialize(raw: &str, now_ms: i64) -> Result<Decoded, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let Some(envelope) = value.as_object() else {
        return Err(DecodeError::Malformed("envelope is not an object".to_string()));
    };

    let header = envelope.get("header").and_then(Value::as_str);
    if header != Some(SAVE_HEADER) {
        return Err(DecodeError::HeaderMismatch {
            found: header.map(str::to_string),
        });
    }

    let version = envelope.get("version").and_then(Value::as_i64);
    if version != Some(SAVE_FORMAT_VERSION as i64) {
        return Err(DecodeError::VersionMismatch {
            found: version,
            expected: SAVE_FORMAT_VERSION,
        });
    }

    let state = match envelope.get("state") {
        Some(state) if !state.is_null() => state,
        _ => return Err(DecodeError::MissingState),
    };

    validate_structure(state)
        .into_result()
        .map_err(DecodeError::InvalidStructure)?;
    let snapshot: GameSnapshot = serde_json::from_value(state.clone())
        .map_err(|e| DecodeError::InvalidStructure(vec![e.to_string()]))?;

    validate_integrity(&snapshot, now_ms)
        .into_result()
        .map_err(DecodeError::IntegrityViolation)?;

    let mut warnings: Vec<String> = envelope.keys()
        .filter(|key| !ENVELOPE_FIELDS.contains(&key.as_str()))
        .map(|key| format!("Ignoring unknown envelope field '{}'", key))
        .collect();

    let saved_at_ms = envelope.get("timestamp").and_then(Value::as_i64);
    if saved_at_ms.is_none() {
        warnings.push("Envelope has no timestamp".to_string());
    }

    Ok(Decoded {
        snapshot,
        saved_at_ms,
        warnings,
    })
}

/// Empty-board `Playing` snapshot used when a save cannot be restored.
///
/// Passes both structural and integrity validation at `now_ms`.
pub fn create_fallback(now_ms: i64) -> GameSnapshot {
    GameSnapshot::empty(now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Board, Phase, WIN_TILE};
    use crate::persistence::validation::MAX_SNAPSHOT_AGE_MS;
    use proptest::prelude::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn sample() -> GameSnapshot {
        GameSnapshot {
            board: Board::from_rows([[2, 4, 0, 0], [0, 8, 0, 0], [0, 0, 16, 0], [0, 0, 0, 2]]),
            score: 48,
            phase: Phase::Playing,
            move_count: 9,
            started_at_ms: NOW - 60_000,
        }
    }

    fn envelope_json(state: Value) -> String {
        json!({
            "header": SAVE_HEADER,
            "version": SAVE_FORMAT_VERSION,
            "timestamp": NOW,
            "state": state,
        })
        .to_string()
    }

    #[test]
    fn test_roundtrip() {
        let raw = serialize(&sample(), NOW).unwrap();
        let decoded = deserialize(&raw, NOW).unwrap();
        assert_eq!(decoded.snapshot, sample());
        assert_eq!(decoded.saved_at_ms, Some(NOW));
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn test_roundtrip_finished_games() {
        let mut won = sample();
        won.board.set(2, 2, WIN_TILE);
        won.phase = Phase::Won;

        let lost = GameSnapshot {
            board: Board::from_rows([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]),
            phase: Phase::Lost,
            ..sample()
        };

        for (snapshot, literal) in [(won, "won"), (lost, "lost")] {
            let raw = serialize(&snapshot, NOW).unwrap();
            let value: Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(value["state"]["gameState"], literal);
            assert_eq!(deserialize(&raw, NOW).unwrap().snapshot, snapshot);
        }
    }

    #[test]
    fn test_reencode_is_byte_identical() {
        let raw = serialize(&sample(), NOW).unwrap();
        let decoded = deserialize(&raw, NOW).unwrap();
        let again = serialize(&decoded.snapshot, decoded.saved_at_ms.unwrap()).unwrap();
        assert_eq!(raw, again);
    }

    #[test]
    fn test_envelope_layout() {
        let raw = serialize(&sample(), NOW).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["header"], SAVE_HEADER);
        assert_eq!(value["version"], 1);
        assert_eq!(value["timestamp"], NOW);
        assert_eq!(value["state"]["gameState"], "playing");
        assert_eq!(value["state"]["board"][0][1], 4);
    }

    #[test]
    fn test_serialize_rejects_invalid_structure() {
        let mut snapshot = sample();
        snapshot.started_at_ms = 0;
        let err = serialize(&snapshot, NOW).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidState(ref e) if e.len() == 1));
        assert!(err.to_string().contains("Start time"));
    }

    #[test]
    fn test_wrong_header() {
        let raw = json!({ "header": "WRONG", "version": 1, "timestamp": NOW, "state": {} }).to_string();
        let err = deserialize(&raw, NOW).unwrap_err();
        assert_eq!(err, DecodeError::HeaderMismatch { found: Some("WRONG".to_string()) });
        assert!(err.fallback_to_new_game());
    }

    #[test]
    fn test_failure_categories_in_order() {
        assert_eq!(deserialize("", NOW).unwrap_err(), DecodeError::EmptyInput);
        assert_eq!(deserialize("   ", NOW).unwrap_err(), DecodeError::EmptyInput);
        assert!(matches!(deserialize("{not json", NOW), Err(DecodeError::Malformed(_))));
        assert!(matches!(deserialize("[1,2]", NOW), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            deserialize(r#"{"version": 1}"#, NOW),
            Err(DecodeError::HeaderMismatch { found: None })
        ));

        let old = json!({ "header": SAVE_HEADER, "version": 0, "state": {} }).to_string();
        assert_eq!(
            deserialize(&old, NOW).unwrap_err(),
            DecodeError::VersionMismatch { found: Some(0), expected: SAVE_FORMAT_VERSION }
        );

        let stateless = json!({ "header": SAVE_HEADER, "version": 1, "timestamp": NOW }).to_string();
        assert_eq!(deserialize(&stateless, NOW).unwrap_err(), DecodeError::MissingState);
        let null_state = envelope_json(Value::Null);
        assert_eq!(deserialize(&null_state, NOW).unwrap_err(), DecodeError::MissingState);

        let bad_shape = envelope_json(json!({ "board": [], "score": 0 }));
        assert!(matches!(deserialize(&bad_shape, NOW), Err(DecodeError::InvalidStructure(_))));

        let mut tampered = serde_json::to_value(sample()).unwrap();
        tampered["board"][0][0] = json!(3);
        let err = deserialize(&envelope_json(tampered), NOW).unwrap_err();
        assert_eq!(
            err,
            DecodeError::IntegrityViolation(vec!["Invalid tile value 3 at [0][0]".to_string()])
        );
    }

    #[test]
    fn test_every_failure_requests_fallback() {
        let numeric_state = envelope_json(json!(1));
        let inputs: [&str; 4] = ["", "nope", r#"{"header":"x"}"#, numeric_state.as_str()];
        for raw in inputs {
            assert!(deserialize(raw, NOW).unwrap_err().fallback_to_new_game());
        }
    }

    #[test]
    fn test_stale_save_rejected() {
        let raw = serialize(&sample(), NOW).unwrap();
        let later = NOW + MAX_SNAPSHOT_AGE_MS;
        assert!(matches!(deserialize(&raw, later), Err(DecodeError::IntegrityViolation(_))));
    }

    #[test]
    fn test_won_without_2048_rejected() {
        let mut snapshot = sample();
        snapshot.phase = Phase::Won;
        let raw = serialize(&snapshot, NOW).unwrap();
        assert!(matches!(deserialize(&raw, NOW), Err(DecodeError::IntegrityViolation(_))));

        snapshot.board.set(3, 3, WIN_TILE);
        let raw = serialize(&snapshot, NOW).unwrap();
        assert_eq!(deserialize(&raw, NOW).unwrap().snapshot.phase, Phase::Won);
    }

    #[test]
    fn test_unknown_fields_are_warnings() {
        let mut value = serde_json::from_str::<Value>(&serialize(&sample(), NOW).unwrap()).unwrap();
        value["client"] = json!("vscode");
        let decoded = deserialize(&value.to_string(), NOW).unwrap();
        assert_eq!(decoded.snapshot, sample());
        assert_eq!(decoded.warnings, vec!["Ignoring unknown envelope field 'client'".to_string()]);
    }

    #[test]
    fn test_fallback_passes_validation() {
        let fallback = create_fallback(NOW);
        let value = serde_json::to_value(&fallback).unwrap();
        assert!(validate_structure(&value).is_valid());
        assert!(validate_integrity(&fallback, NOW).is_valid());
        assert_eq!(fallback.board, Board::EMPTY);
        assert_eq!(fallback.phase, Phase::Playing);
    }

    fn tile() -> impl Strategy<Value = u32> {
        prop_oneof![3 => Just(0u32), 1 => (1u32..11).prop_map(|exp| 1 << exp)]
    }

    fn phase() -> impl Strategy<Value = Phase> {
        prop_oneof![Just(Phase::Playing), Just(Phase::Won), Just(Phase::Lost)]
    }

    /// Snapshots whose board agrees with their phase: won boards carry a
    /// 2048, lost boards have no empty cell.
    fn valid_snapshot() -> impl Strategy<Value = GameSnapshot> {
        (
            prop::array::uniform4(prop::array::uniform4(tile())),
            phase(),
            0..16usize,
            any::<u32>(),
            any::<u32>(),
            0..MAX_SNAPSHOT_AGE_MS,
        )
            .prop_map(|(mut rows, phase, cell, score, moves, age)| {
                match phase {
                    Phase::Won => rows[cell / 4][cell % 4] = WIN_TILE,
                    Phase::Lost => {
                        for value in rows.iter_mut().flatten().filter(|v| **v == 0) {
                            *value = 2;
                        }
                    }
                    Phase::Playing => {}
                }
                GameSnapshot {
                    board: Board::from_rows(rows),
                    score: score as u64,
                    phase,
                    move_count: moves as u64,
                    started_at_ms: NOW - age,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_roundtrip_law(snapshot in valid_snapshot(), saved_at in 0..NOW) {
            let raw = serialize(&snapshot, saved_at).unwrap();
            let decoded = deserialize(&raw, NOW).unwrap();
            prop_assert_eq!(decoded.snapshot, snapshot);
        }

        #[test]
        fn prop_garbage_never_panics(raw in ".{0,64}") {
            let _ = deserialize(&raw, NOW);
        }
    }
}
