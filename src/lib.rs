//! HITL gateway — human-in-the-loop request tracking for agent hook events.
//!
//! Events come in, adapters turn the ones that need a human into
//! [`models::HitlRequest`]s, the [`hitl::HitlService`] tracks them until a
//! response, timeout, or error, and answers are pushed back to the agent
//! over WebSocket.

pub mod adapters;
pub mod api;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod hitl;
pub mod models;
pub mod notification;
