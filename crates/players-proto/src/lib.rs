//! Shared pieces of the players-bar rendezvous protocol: wire codes and
//! frames, the player registry, file-backed broadcast channels, paths and
//! configuration.

pub mod channel;
pub mod config;
pub mod platform;
pub mod protocol;
pub mod state;
