//! Game Controller
//!
//! Owns at most one live [`GameEngine`] and mediates between it, the save
//! serializer, the key-value store and the outbound message sink.
//!
//! The controller is `Active` until [`GameController::dispose`], after which
//! every operation fails with [`ControllerError::Disposed`]. Storage and
//! delivery failures are logged and absorbed; only a failure to produce any
//! board at all escapes as [`ControllerError::Fatal`].

use std::sync::Arc;
use std::time::Duration;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::clock::{Clock, SystemClock};
use crate::core::hash::short_hex;
use crate::core::rng::{entropy_seed, DeterministicRng};
use crate::game::engine::{EngineError, GameEngine, MoveResult};
use crate::game::moves::Direction;
use crate::game::state::{classify, GameSnapshot, Phase};
use crate::network::outbox::{Delivery, MessageSink, Outbox};
use crate::network::protocol::{
    decode_inbound, message_id, ErrorCode, InboundPayload, MessageError, OutboundMessage,
    OutboundPayload, ReportedError, ShareData, Theme,
};
use crate::persistence::envelope::{deserialize, serialize};
use crate::persistence::store::KeyValueStore;
use crate::persistence::validation::{validate_integrity, validate_structure};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Store key of the saved game.
    pub storage_key: String,
    /// Throwaway key written by [`GameController::health_check`].
    pub health_probe_key: String,
    /// Delay before the single send retry.
    pub send_retry_delay: Duration,
    /// Seed for new games. `None` draws one from entropy.
    pub rng_seed: Option<u64>,
    /// Initial theme.
    pub theme: Theme,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            storage_key: "twenty48.gameState".to_string(),
            health_probe_key: "twenty48.healthProbe".to_string(),
            send_retry_delay: Duration::from_millis(100),
            rng_seed: None,
            theme: Theme::default(),
        }
    }
}

impl ControllerConfig {
    /// Defaults overridden by `TWENTY48_*` environment variables.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_key: std::env::var("TWENTY48_STORAGE_KEY").unwrap_or(defaults.storage_key),
            health_probe_key: defaults.health_probe_key,
            send_retry_delay: std::env::var("TWENTY48_SEND_RETRY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.send_retry_delay),
            rng_seed: std::env::var("TWENTY48_RNG_SEED").ok().and_then(|v| v.parse().ok()),
            theme: std::env::var("TWENTY48_THEME")
                .ok()
                .and_then(|v| Theme::parse(&v))
                .unwrap_or(defaults.theme),
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Controller errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    /// Called after [`GameController::dispose`].
    #[error("controller disposed")]
    Disposed,

    /// No board could be produced, not even the fallback.
    #[error("fatal: unable to create a game board: {0}")]
    Fatal(String),
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Accepting calls.
    Active,
    /// Shut down for good.
    Disposed,
}

/// Builds and initializes an engine from a seed and start time.
pub type EngineFactory = fn(u64, i64) -> Result<GameEngine, EngineError>;

/// Why a move request did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No game is live.
    NoGame,
    /// Not one of `up`, `down`, `left`, `right`.
    InvalidDirection(String),
    /// The game already ended.
    GameOver(Phase),
}

/// Outcome of [`GameController::apply_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveDisposition {
    /// Board changed; state persisted and emitted.
    Moved(MoveResult),
    /// Legal request, but nothing slid.
    Unchanged,
    /// Request dropped.
    Ignored(IgnoreReason),
}

/// Result of [`GameController::health_check`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// No issues found.
    pub healthy: bool,
    /// One line per problem.
    pub issues: Vec<String>,
}

/// Outcome of [`GameController::handle_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Message handled; carries its wire tag.
    Handled(&'static str),
    /// Message failed validation; an error was sent back.
    Rejected(Vec<String>),
    /// Share text produced for a `shareScore` request.
    Shared(String),
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Mediates one game session.
pub struct GameController {
    config: ControllerConfig,
    state: ControllerState,
    store: Box<dyn KeyValueStore>,
    outbox: Outbox,
    clock: Arc<dyn Clock>,
    engine: Option<GameEngine>,
    engine_factory: EngineFactory,
    seeds: DeterministicRng,
    theme: Theme,
    /// Id of the inbound message being handled; replies reuse it.
    current_request: Option<String>,
}

impl GameController {
    /// Create a controller over `store`, with the system clock and no sink.
    pub fn new(config: ControllerConfig, store: Box<dyn KeyValueStore>) -> Self {
        let seed = config.rng_seed.unwrap_or_else(entropy_seed);
        Self {
            outbox: Outbox::new(config.send_retry_delay),
            theme: config.theme,
            state: ControllerState::Active,
            store,
            clock: Arc::new(SystemClock),
            engine: None,
            engine_factory: GameEngine::started,
            seeds: DeterministicRng::new(seed),
            current_request: None,
            config,
        }
    }

    /// Use `clock` for timestamps and integrity checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `factory` to build engines.
    pub fn with_engine_factory(mut self, factory: EngineFactory) -> Self {
        self.engine_factory = factory;
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Disposed already.
    pub fn is_disposed(&self) -> bool {
        self.state == ControllerState::Disposed
    }

    /// Snapshot of the live game, if any.
    pub fn snapshot(&self) -> Option<GameSnapshot> {
        self.engine.as_ref().map(GameEngine::snapshot)
    }

    /// Current theme.
    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Configuration in use.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn ensure_active(&self) -> Result<(), ControllerError> {
        match self.state {
            ControllerState::Active => Ok(()),
            ControllerState::Disposed => Err(ControllerError::Disposed),
        }
    }

    // -------------------------------------------------------------------------
    // Game operations
    // -------------------------------------------------------------------------

    /// Start a fresh game, persist it and emit `newGame`.
    ///
    /// If the engine cannot be built, a minimal two-tile board is emitted
    /// without an engine behind it. If even that fails, a non-recoverable
    /// error is emitted and [`ControllerError::Fatal`] returned.
    pub async fn start_new_game(&mut self) -> Result<GameSnapshot, ControllerError> {
        self.ensure_active()?;
        let now = self.clock.now_ms();
        let seed = self.seeds.next_u64();

        match (self.engine_factory)(seed, now) {
            Ok(engine) => {
                let snapshot = engine.snapshot();
                self.engine = Some(engine);
                info!("New game started (seed {})", seed);
                self.save(&snapshot);
                self.emit(OutboundPayload::NewGame { state: snapshot.clone() }).await;
                Ok(snapshot)
            }
            Err(e) => {
                error!("Engine construction failed: {}", e);
                self.engine = None;
                match fallback_opening(now) {
                    Ok(snapshot) => {
                        warn!("Emitting fallback board without an engine");
                        self.emit(OutboundPayload::NewGame { state: snapshot.clone() }).await;
                        Ok(snapshot)
                    }
                    Err(reason) => {
                        error!("Fallback board failed: {}", reason);
                        let report = OutboundMessage::error(
                            "Unable to start a game",
                            ErrorCode::EngineUnavailable,
                            false,
                        );
                        self.send(report).await;
                        Err(ControllerError::Fatal(reason))
                    }
                }
            }
        }
    }

    /// Slide the live board toward `direction`.
    ///
    /// Ignored without a live game, with an unknown direction, or once the
    /// game has ended. A move that changes nothing emits nothing.
    pub async fn apply_move(&mut self, direction: &str) -> Result<MoveDisposition, ControllerError> {
        self.ensure_active()?;
        let Some(engine) = self.engine.as_mut() else {
            debug!("Move ignored: no live game");
            return Ok(MoveDisposition::Ignored(IgnoreReason::NoGame));
        };
        let Some(parsed) = Direction::parse(direction) else {
            debug!("Move ignored: invalid direction {:?}", direction);
            return Ok(MoveDisposition::Ignored(IgnoreReason::InvalidDirection(direction.to_string())));
        };
        if engine.phase() != Phase::Playing {
            debug!("Move ignored: game is {}", engine.phase());
            return Ok(MoveDisposition::Ignored(IgnoreReason::GameOver(engine.phase())));
        }

        let result = engine.apply_move(parsed);
        if !result.moved {
            debug!("Move {} changed nothing", parsed);
            return Ok(MoveDisposition::Unchanged);
        }

        let snapshot = engine.snapshot();
        debug!("Moved {}: +{} (score {})", parsed, result.score_delta, snapshot.score);
        if result.events.iter().any(|e| e.is_phase_change()) {
            info!("Game ended: {} with score {}", snapshot.phase, snapshot.score);
        }

        self.save(&snapshot);
        self.emit(OutboundPayload::GameStateUpdate { state: snapshot }).await;
        Ok(MoveDisposition::Moved(result))
    }

    /// Adopt a state reported by the rendering surface.
    ///
    /// Structurally invalid input emits `Failed to update game state` and
    /// changes nothing. Valid input replaces the live board (creating an
    /// engine if needed), has its phase re-derived from the board and is
    /// persisted. Nothing is emitted on success.
    pub async fn ingest_external_state(&mut self, candidate: &Value) -> Result<bool, ControllerError> {
        self.ensure_active()?;

        let report = validate_structure(candidate);
        let decoded = match report.into_result() {
            Ok(()) => serde_json::from_value::<GameSnapshot>(candidate.clone())
                .map_err(|e| vec![e.to_string()]),
            Err(errors) => Err(errors),
        };

        match decoded {
            Ok(snapshot) => {
                self.adopt_state(snapshot);
                Ok(true)
            }
            Err(errors) => {
                warn!("Rejected external state: {}", errors.join("; "));
                let report = OutboundMessage::error(
                    "Failed to update game state",
                    ErrorCode::InvalidState,
                    true,
                );
                self.send(report).await;
                Ok(false)
            }
        }
    }

    fn adopt_state(&mut self, mut snapshot: GameSnapshot) {
        snapshot.phase = classify(&snapshot.board);
        let engine = self.engine.get_or_insert_with(|| GameEngine::new(self.seeds.next_u64()));
        engine.hydrate(&snapshot);
        debug!("Adopted external state (score {}, {})", snapshot.score, snapshot.phase);
        self.save(&snapshot);
    }

    /// Best-effort save of `snapshot`. Returns whether it was written.
    pub fn persist(&mut self, snapshot: &GameSnapshot) -> Result<bool, ControllerError> {
        self.ensure_active()?;
        Ok(self.save(snapshot))
    }

    fn save(&mut self, snapshot: &GameSnapshot) -> bool {
        let encoded = match serialize(snapshot, self.clock.now_ms()) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Not saving game: {}", e);
                return false;
            }
        };
        match self.store.set(&self.config.storage_key, Some(&encoded)) {
            Ok(()) => {
                debug!("Saved game {}", short_hex(&snapshot.fingerprint()));
                true
            }
            Err(e) => {
                warn!("Failed to save game: {}", e);
                false
            }
        }
    }

    /// Read the saved game.
    ///
    /// A save that cannot be read or decoded is removed and `None` returned.
    pub fn load_persisted(&mut self) -> Result<Option<GameSnapshot>, ControllerError> {
        self.ensure_active()?;
        let key = self.config.storage_key.clone();

        let raw = match self.store.get(&key) {
            Ok(None) => return Ok(None),
            Ok(Some(raw)) => raw,
            Err(e) => {
                warn!("Failed to read saved game: {}", e);
                self.clear_saved(&key);
                return Ok(None);
            }
        };

        match deserialize(&raw, self.clock.now_ms()) {
            Ok(decoded) => {
                for warning in &decoded.warnings {
                    debug!("Saved game: {}", warning);
                }
                Ok(Some(decoded.snapshot))
            }
            Err(e) => {
                warn!("Discarding saved game: {}", e);
                self.clear_saved(&key);
                Ok(None)
            }
        }
    }

    fn clear_saved(&mut self, key: &str) {
        if let Err(e) = self.store.set(key, None) {
            warn!("Failed to clear saved game: {}", e);
        }
    }

    /// Resume the saved game and emit `gameStateChanged`, or start a new
    /// game if there is none.
    pub async fn restore_saved_game(&mut self) -> Result<GameSnapshot, ControllerError> {
        let Some(snapshot) = self.load_persisted()? else {
            info!("No saved game, starting a new one");
            return self.start_new_game().await;
        };

        let mut engine = GameEngine::new(self.seeds.next_u64());
        engine.hydrate(&snapshot);
        self.engine = Some(engine);
        info!("Restored saved game (score {}, {} moves)", snapshot.score, snapshot.move_count);
        self.emit(OutboundPayload::GameStateChanged { state: snapshot.clone() }).await;
        Ok(snapshot)
    }

    /// Emit the current theme.
    pub async fn request_theme(&mut self) -> Result<Theme, ControllerError> {
        self.ensure_active()?;
        let theme = self.theme;
        self.emit(OutboundPayload::ThemeChanged { theme }).await;
        Ok(theme)
    }

    /// Change the theme and emit it.
    pub async fn set_theme(&mut self, theme: Theme) -> Result<(), ControllerError> {
        self.ensure_active()?;
        if self.theme != theme {
            info!("Theme changed to {:?}", theme);
        }
        self.theme = theme;
        self.emit(OutboundPayload::ThemeChanged { theme }).await;
        Ok(())
    }

    /// Build the share text for `share`.
    pub fn share_score(&self, share: &ShareData) -> Result<String, ControllerError> {
        self.ensure_active()?;
        let text = share.share_text();
        info!("Share: {}", text);
        Ok(text)
    }

    // -------------------------------------------------------------------------
    // Health
    // -------------------------------------------------------------------------

    /// Probe the store and check the live board.
    pub fn health_check(&mut self) -> Result<HealthReport, ControllerError> {
        self.ensure_active()?;
        let mut issues = self.store_issues();
        issues.extend(self.engine_issues());
        Ok(HealthReport {
            healthy: issues.is_empty(),
            issues,
        })
    }

    fn store_issues(&mut self) -> Vec<String> {
        let mut issues = Vec::new();
        let key = self.config.health_probe_key.clone();
        let probe = self.clock.now_ms().to_string();

        if let Err(e) = self.store.set(&key, Some(&probe)) {
            issues.push(format!("Store is not writable: {}", e));
            return issues;
        }
        match self.store.get(&key) {
            Ok(Some(value)) if value == probe => {}
            Ok(_) => issues.push("Store did not return the probe value".to_string()),
            Err(e) => issues.push(format!("Store is not readable: {}", e)),
        }
        if let Err(e) = self.store.set(&key, None) {
            issues.push(format!("Store probe could not be cleared: {}", e));
        }
        issues
    }

    fn engine_issues(&self) -> Vec<String> {
        let Some(engine) = &self.engine else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        match serde_json::to_value(engine.snapshot()) {
            Ok(value) => {
                for error in validate_structure(&value).errors {
                    issues.push(format!("Live board: {}", error));
                }
            }
            Err(e) => issues.push(format!("Live board cannot be encoded: {}", e)),
        }
        if !engine.board_is_well_formed() {
            issues.push("Live board holds an invalid tile".to_string());
        }
        issues
    }

    /// Rebuild the engine if it is missing or broken.
    ///
    /// Returns true when the issue count did not grow.
    pub async fn attempt_recovery(&mut self) -> Result<bool, ControllerError> {
        let before = self.health_check()?;

        if self.engine.is_none() || !self.engine_issues().is_empty() {
            info!("Recovering: reinitializing the engine");
            let now = self.clock.now_ms();
            match (self.engine_factory)(self.seeds.next_u64(), now) {
                Ok(engine) => {
                    let snapshot = engine.snapshot();
                    self.engine = Some(engine);
                    self.save(&snapshot);
                    self.emit(OutboundPayload::NewGame { state: snapshot }).await;
                }
                Err(e) => error!("Recovery failed to build an engine: {}", e),
            }
        }

        let after = self.health_check()?;
        let recovered = after.issues.len() <= before.issues.len();
        if recovered {
            info!("Recovery finished with {} issue(s)", after.issues.len());
        } else {
            warn!("Recovery made things worse: {:?}", after.issues);
        }
        Ok(recovered)
    }

    // -------------------------------------------------------------------------
    // Lifecycle and messaging
    // -------------------------------------------------------------------------

    /// Save the live game and shut down. Later calls fail with
    /// [`ControllerError::Disposed`].
    pub fn dispose(&mut self) -> Result<(), ControllerError> {
        self.ensure_active()?;
        if let Some(snapshot) = self.snapshot() {
            self.save(&snapshot);
        }
        self.outbox.detach();
        self.state = ControllerState::Disposed;
        info!("Controller disposed");
        Ok(())
    }

    /// Attach the outbound sink, flushing anything emitted before it.
    pub async fn attach_sink(&mut self, sink: Box<dyn MessageSink>) -> Result<usize, ControllerError> {
        self.ensure_active()?;
        Ok(self.outbox.attach(sink).await)
    }

    /// Parse, validate and handle one raw inbound message.
    ///
    /// Invalid messages are answered with an `error` message, never an `Err`.
    pub async fn handle_message(&mut self, raw: &str) -> Result<Dispatch, ControllerError> {
        self.ensure_active()?;

        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(e) => return Ok(self.reject(vec![format!("Message is not valid JSON: {}", e)]).await),
        };
        self.current_request = message_id(&value).map(str::to_string);

        let message = match decode_inbound(&value) {
            Ok(message) => message,
            Err(MessageError::Invalid(errors)) => return Ok(self.reject(errors).await),
            Err(MessageError::Malformed(reason)) => return Ok(self.reject(vec![reason]).await),
        };

        debug!("Handling {} message", message.kind());
        let kind = message.kind();
        self.current_request = message.id;
        let outcome = self.dispatch(kind, message.payload).await;
        self.current_request = None;
        outcome
    }

    async fn reject(&mut self, errors: Vec<String>) -> Dispatch {
        warn!("Rejected inbound message: {}", errors.join("; "));
        let report = OutboundMessage::error(
            format!("Invalid message: {}", errors.join("; ")),
            ErrorCode::InvalidMessage,
            true,
        );
        self.send(report).await;
        self.current_request = None;
        Dispatch::Rejected(errors)
    }

    async fn dispatch(&mut self, kind: &'static str, payload: InboundPayload) -> Result<Dispatch, ControllerError> {
        match payload {
            InboundPayload::RequestNewGame => {
                self.start_new_game().await?;
            }
            InboundPayload::GameMove { direction } => {
                self.apply_move(direction.as_str()).await?;
            }
            InboundPayload::GameStateUpdate { state } => {
                self.adopt_state(state);
            }
            InboundPayload::RequestTheme => {
                self.request_theme().await?;
            }
            InboundPayload::RequestSavedGame => {
                self.restore_saved_game().await?;
            }
            InboundPayload::ShareScore { share_data } => {
                return Ok(Dispatch::Shared(self.share_score(&share_data)?));
            }
            InboundPayload::ReportError { error } => {
                log_reported(&error);
            }
        }
        Ok(Dispatch::Handled(kind))
    }

    /// Handle raw messages from `inbound` one at a time until the channel
    /// closes, then dispose.
    pub async fn run(&mut self, mut inbound: mpsc::Receiver<String>) -> Result<(), ControllerError> {
        while let Some(raw) = inbound.recv().await {
            if let Err(e) = self.handle_message(&raw).await {
                error!("Controller stopped: {}", e);
                return Err(e);
            }
        }
        debug!("Inbound channel closed");
        self.dispose()
    }

    async fn emit(&mut self, payload: OutboundPayload) -> Delivery {
        self.send(OutboundMessage::new(payload)).await
    }

    async fn send(&mut self, message: OutboundMessage) -> Delivery {
        let message = message.in_reply_to(self.current_request.as_deref());
        self.outbox.deliver(message).await
    }
}

impl std::fmt::Debug for GameController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameController")
            .field("state", &self.state)
            .field("engine", &self.engine)
            .field("theme", &self.theme)
            .field("outbox", &self.outbox)
            .finish_non_exhaustive()
    }
}

fn log_reported(error: &ReportedError) {
    match &error.stack {
        Some(stack) => warn!("Surface reported error: {}\n{}", error.message, stack),
        None => warn!("Surface reported error: {}", error.message),
    }
}

/// Hand-built opening: a 2 in each top corner.
fn fallback_opening(now_ms: i64) -> Result<GameSnapshot, String> {
    let mut snapshot = GameSnapshot::empty(now_ms);
    snapshot.board.set(0, 0, 2);
    snapshot.board.set(0, 3, 2);

    let value = serde_json::to_value(&snapshot).map_err(|e| e.to_string())?;
    let mut errors = validate_structure(&value).errors;
    errors.extend(validate_integrity(&snapshot, now_ms).errors);
    if errors.is_empty() {
        Ok(snapshot)
    } else {
        Err(errors.join("; "))
    }
}
