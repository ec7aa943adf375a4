//! Minimal client-side framed transport.
//!
//! The harness trusts the endpoint's framing and only needs to move opaque
//! text payloads across a persistent connection: parse incoming frames, mask
//! and write outgoing ones, and perform the HTTP upgrade that establishes the
//! channel. Nothing here validates payload content.

pub mod frame;
pub mod handshake;

pub use frame::{Frame, OpCode};
pub use handshake::{UpgradeRequest, UpgradeResponse, compute_accept_key};
