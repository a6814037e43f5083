//! Client for the signaling service.
//!
//! The service is a room-scoped relay: peers join a room named after the
//! session id and every event they emit is forwarded to the other members.
//! [`WsSignalingClient`] speaks its JSON envelope over a WebSocket and
//! plugs into a transfer session as its [`SignalingChannel`].
//!
//! [`SignalingChannel`]: shareit_transfer::SignalingChannel

mod client;
mod error;
pub(crate) mod pumps;

pub use client::WsSignalingClient;
pub use error::SignalingError;
