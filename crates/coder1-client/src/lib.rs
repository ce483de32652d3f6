//! # coder1-client
//!
//! WebSocket client that multiplexes streamed LLM responses and session
//! subscriptions over a single connection.
//!
//! - [`StreamClient`]: cheap, cloneable handle; every operation is a message
//!   to one connection task that owns all state.
//! - [`ConnectionState`] / [`ReconnectTracker`]: bounded fixed-interval
//!   reconnect as an explicit state machine.
//! - [`StreamRegistry`]: per-stream status, authoritative accumulated text
//!   and callbacks, with a grace window after completion.
//! - [`Dispatcher`]: routes inbound frames by `type`.
//! - [`EventHub`]: synchronous listeners plus a broadcast channel.

#![deny(unsafe_code)]

pub mod client;
mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod errors;
pub mod events;
pub mod registry;
pub mod state;
pub mod subscriptions;

pub use client::{StreamClient, StreamOptions};
pub use dispatcher::Dispatcher;
pub use endpoint::{Endpoint, derive_ws_url, resolve_ws_url};
pub use errors::{ClientError, Result};
pub use events::{ClientEvent, EventHub, EventKind, ListenerId};
pub use registry::{
    CompletedStream, StreamCallbacks, StreamChunk, StreamFailure, StreamRegistry, StreamSnapshot,
    StreamStatus,
};
pub use state::{ConnectionState, ReconnectTracker};
pub use subscriptions::SessionSubscriptions;
