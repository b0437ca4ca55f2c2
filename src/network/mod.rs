//! Network Layer
//!
//! The message contract, outbound delivery, the game controller, and a
//! WebSocket host. Game rules live in `game/`; this layer only routes.

pub mod protocol;
pub mod outbox;
pub mod controller;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use protocol::{
    InboundMessage, InboundPayload, OutboundMessage, OutboundPayload, ErrorCode, MessageError,
    ShareData, ReportedError, Theme, parse_inbound, parse_outbound, validate_inbound,
    validate_outbound,
};
pub use outbox::{MessageSink, Outbox, Delivery, SinkError};
pub use controller::{
    GameController, ControllerConfig, ControllerError, ControllerState, Dispatch,
    HealthReport, MoveDisposition, IgnoreReason,
};
pub use server::{GameServer, ServerConfig, GameServerError};
