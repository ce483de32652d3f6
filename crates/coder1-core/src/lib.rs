//! # coder1-core
//!
//! Foundation types shared by the Coder1 stream client crates:
//!
//! - **Branded IDs**: `StreamId`, `SessionId`, `ClientId` as newtypes for type safety
//! - **Protocol**: `OutboundFrame` / `InboundFrame` for the JSON-over-WebSocket wire format
//! - **Errors**: `ProtocolError` via `thiserror`
//! - **Logging**: `tracing` subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::ProtocolError;
pub use ids::{ClientId, SessionId, StreamId};
pub use protocol::{GenerationOptions, Inbound, InboundFrame, OutboundFrame, decode_inbound};
