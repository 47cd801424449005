//! Wire types for the obs-websocket v5 control protocol.
//!
//! This crate contains the serde-serializable types exchanged with a running
//! OBS Studio instance over its WebSocket control endpoint. These types
//! represent the "protocol layer": the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with protocol: Match the obs-websocket v5 message schema
//! * Stable: Changes only when the wire protocol changes
//!
//! Connection handling and session logic are built on top of these types in
//! `autocast-runtime` and `autocast`.

pub mod codes;
pub mod data;
pub mod envelope;
pub mod messages;

pub use codes::*;
pub use data::*;
pub use envelope::*;
pub use messages::*;
