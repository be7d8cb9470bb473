//! Parley: a streaming chat relay and a multi-session chat client.
//!
//! The relay (`api`, `relay`, `provider`) forwards a conversation to an upstream
//! completion API and re-streams its output as server-sent events. The client
//! side (`client`, `sessions`, `prompts`) keeps persisted conversations and grows
//! the in-progress assistant message as fragments arrive.

pub mod api;
pub mod client;
pub mod prompts;
pub mod provider;
pub mod relay;
pub mod sessions;
pub mod storage;
pub mod store;

pub use parley_protocol as protocol;
