//! Protocol Messages
//!
//! Messages exchanged between the controller and the rendering surface.
//! Every message is a JSON object tagged by `type`, with an optional
//! correlation `id` and epoch-ms `timestamp` alongside the payload.
//!
//! Typed enums cover each direction; the structural validators guard the
//! boundary where untrusted JSON enters.

use serde::{Serialize, Deserialize};
use serde_json::Value;

use crate::game::moves::Direction;
use crate::game::state::GameSnapshot;
use crate::persistence::validation::{validate_structure, ValidationReport};

// =============================================================================
// SURFACE -> CONTROLLER MESSAGES
// =============================================================================

/// Payloads sent from the rendering surface to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundPayload {
    /// Start over.
    RequestNewGame,

    /// Slide the board.
    GameMove {
        /// Slide direction.
        direction: Direction,
    },

    /// The surface reports an authoritative state.
    GameStateUpdate {
        /// State to adopt.
        state: GameSnapshot,
    },

    /// Ask for the current theme.
    RequestTheme,

    /// Ask for the persisted game, if any.
    RequestSavedGame,

    /// Share a result.
    ShareScore {
        /// What to share.
        #[serde(rename = "shareData")]
        share_data: ShareData,
    },

    /// The surface hit an error of its own.
    ReportError {
        /// The reported failure.
        error: ReportedError,
    },
}

/// Score summary the surface wants to share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareData {
    /// Final or current score.
    pub score: u64,
    /// Largest tile reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tile: Option<u32>,
    /// Moves played.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_count: Option<u64>,
}

impl ShareData {
    /// One-line, human-readable brag.
    pub fn share_text(&self) -> String {
        let mut text = format!("I scored {} in 2048", self.score);
        if let Some(tile) = self.max_tile {
            text.push_str(&format!(", reaching the {} tile", tile));
        }
        if let Some(moves) = self.move_count {
            text.push_str(&format!(" in {} moves", moves));
        }
        text.push('!');
        text
    }
}

/// Error reported by the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    /// What went wrong.
    pub message: String,
    /// Stack trace, if the surface has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Inbound message: payload plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Send time, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// The message itself.
    #[serde(flatten)]
    pub payload: InboundPayload,
}

// =============================================================================
// CONTROLLER -> SURFACE MESSAGES
// =============================================================================

/// Payloads sent from the controller to the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundPayload {
    /// A new game started.
    NewGame {
        /// Opening board.
        state: GameSnapshot,
    },

    /// A move changed the board.
    GameStateUpdate {
        /// Board after the move.
        state: GameSnapshot,
    },

    /// Theme changed (or was requested).
    ThemeChanged {
        /// Theme now in effect.
        theme: Theme,
    },

    /// State replaced without a move (saved game restored).
    GameStateChanged {
        /// Replacement state.
        state: GameSnapshot,
    },

    /// Something failed.
    Error {
        /// Human-readable description.
        message: String,
        /// Machine-readable category.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        /// Whether the session can carry on.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recoverable: Option<bool>,
    },
}

/// Outbound message: payload plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Send time, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// The message itself.
    #[serde(flatten)]
    pub payload: OutboundPayload,
}

/// Host color theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    /// Light background.
    Light,
    /// Dark background.
    #[default]
    Dark,
    /// High-contrast palette.
    HighContrast,
}

impl Theme {
    /// Parse `light`, `dark` or `high-contrast`.
    pub fn parse(s: &str) -> Option<Theme> {
        match s {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            "high-contrast" => Some(Theme::HighContrast),
            _ => None,
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Inbound message failed validation.
    InvalidMessage,
    /// Reported game state failed validation.
    InvalidState,
    /// An outbound message could not be delivered.
    DeliveryFailed,
    /// No board could be constructed at all.
    EngineUnavailable,
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl InboundMessage {
    /// Wrap `payload` with a fresh id and timestamp.
    pub fn new(payload: InboundPayload) -> Self {
        Self {
            id: Some(new_id()),
            timestamp: Some(now_ms()),
            payload,
        }
    }

    /// Wire tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            InboundPayload::RequestNewGame => "requestNewGame",
            InboundPayload::GameMove { .. } => "gameMove",
            InboundPayload::GameStateUpdate { .. } => "gameStateUpdate",
            InboundPayload::RequestTheme => "requestTheme",
            InboundPayload::RequestSavedGame => "requestSavedGame",
            InboundPayload::ShareScore { .. } => "shareScore",
            InboundPayload::ReportError { .. } => "reportError",
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl OutboundMessage {
    /// Wrap `payload` with a fresh id and timestamp.
    pub fn new(payload: OutboundPayload) -> Self {
        Self {
            id: Some(new_id()),
            timestamp: Some(now_ms()),
            payload,
        }
    }

    /// Error message.
    pub fn error(message: impl Into<String>, code: ErrorCode, recoverable: bool) -> Self {
        Self::new(OutboundPayload::Error {
            message: message.into(),
            code: Some(code),
            recoverable: Some(recoverable),
        })
    }

    /// Reuse the id of the message being answered.
    pub fn in_reply_to(mut self, id: Option<&str>) -> Self {
        if let Some(id) = id {
            self.id = Some(id.to_string());
        }
        self
    }

    /// Wire tag, for logs.
    pub fn kind(&self) -> &'static str {
        match self.payload {
            OutboundPayload::NewGame { .. } => "newGame",
            OutboundPayload::GameStateUpdate { .. } => "gameStateUpdate",
            OutboundPayload::ThemeChanged { .. } => "themeChanged",
            OutboundPayload::GameStateChanged { .. } => "gameStateChanged",
            OutboundPayload::Error { .. } => "error",
        }
    }

    /// The carried game state, if any.
    pub fn state(&self) -> Option<&GameSnapshot> {
        match &self.payload {
            OutboundPayload::NewGame { state }
            | OutboundPayload::GameStateUpdate { state }
            | OutboundPayload::GameStateChanged { state } => Some(state),
            OutboundPayload::ThemeChanged { .. } | OutboundPayload::Error { .. } => None,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Message parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// Not JSON, or JSON that does not decode into the typed message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Failed structural validation.
    #[error("invalid message: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Correlation id of a raw message, if it has a string `id`.
pub fn message_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

fn check_metadata(object: &serde_json::Map<String, Value>, report: &mut ValidationReport) {
    if object.get("id").is_some_and(|id| !id.is_string() && !id.is_null()) {
        report.push("Message id must be a string");
    }
    if object.get("timestamp").is_some_and(|t| t.as_i64().is_none() && !t.is_null()) {
        report.push("Message timestamp must be an integer");
    }
}

fn check_state(object: &serde_json::Map<String, Value>, report: &mut ValidationReport) {
    match object.get("state") {
        None => report.push("Message has no state"),
        Some(state) => {
            for error in validate_structure(state).errors {
                report.push(format!("state: {}", error));
            }
        }
    }
}

fn has_message(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|message| !message.trim().is_empty())
}

/// Structurally validate a raw surface-to-controller message.
pub fn validate_inbound(value: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();
    let Some(object) = value.as_object() else {
        report.push("Message must be an object");
        return report;
    };
    check_metadata(object, &mut report);

    match object.get("type").and_then(Value::as_str) {
        None => report.push("Message type must be a string"),
        Some("requestNewGame") | Some("requestTheme") | Some("requestSavedGame") => {}
        Some("gameMove") => {
            let direction = object.get("direction").and_then(Value::as_str);
            if direction.and_then(Direction::parse).is_none() {
                report.push("Move direction must be one of up, down, left, right");
            }
        }
        Some("gameStateUpdate") => check_state(object, &mut report),
        Some("shareScore") => {
            let score = object.get("shareData").and_then(|d| d.get("score"));
            if score.and_then(Value::as_u64).is_none() {
                report.push("Share data must carry a non-negative score");
            }
        }
        Some("reportError") => {
            if !has_message(object.get("error").and_then(|e| e.get("message"))) {
                report.push("Reported error must carry a non-empty message");
            }
        }
        Some(other) => report.push(format!("Unknown message type '{}'", other)),
    }

    report
}

/// Structurally validate a raw controller-to-surface message.
pub fn validate_outbound(value: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();
    let Some(object) = value.as_object() else {
        report.push("Message must be an object");
        return report;
    };
    check_metadata(object, &mut report);

    match object.get("type").and_then(Value::as_str) {
        None => report.push("Message type must be a string"),
        Some("newGame") | Some("gameStateUpdate") | Some("gameStateChanged") => {
            check_state(object, &mut report)
        }
        Some("themeChanged") => {
            if object.get("theme").and_then(Value::as_str).and_then(Theme::parse).is_none() {
                report.push("Theme must be one of light, dark, high-contrast");
            }
        }
        Some("error") => {
            if !has_message(object.get("message")) {
                report.push("Error must carry a non-empty message");
            }
            if object.get("recoverable").is_some_and(|r| !r.is_boolean()) {
                report.push("Error recoverable flag must be a boolean");
            }
        }
        Some(other) => report.push(format!("Unknown message type '{}'", other)),
    }

    report
}

/// Validate and decode an already-parsed inbound message.
pub fn decode_inbound(value: &Value) -> Result<InboundMessage, MessageError> {
    validate_inbound(value).into_result().map_err(MessageError::Invalid)?;
    serde_json::from_value(value.clone()).map_err(|e| MessageError::Malformed(e.to_string()))
}

/// Parse, validate and decode a raw inbound message.
pub fn parse_inbound(raw: &str) -> Result<InboundMessage, MessageError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| MessageError::Malformed(e.to_string()))?;
    decode_inbound(&value)
}

/// Parse, validate and decode a raw outbound message.
pub fn parse_outbound(raw: &str) -> Result<OutboundMessage, MessageError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| MessageError::Malformed(e.to_string()))?;
    validate_outbound(&value).into_result().map_err(MessageError::Invalid)?;
    serde_json::from_value(value).map_err(|e| MessageError::Malformed(e.to_string()))
}
