//! Skyward Server Library
//!
//! Replication engine and authoritative server for a multiplayer 2D plane game.
//!
//! # Layout
//!
//! - [`arena`] - player registry, nickname/PID allocation, subsystem dispatch
//! - [`sky`] - physics-backed game world replicated through `Networked` deltas
//! - [`net`] - packets, the typed `Telegraph` channel, transport host and WebTransport adapter
//! - [`server`] / [`client`] - the two ends of a replicated arena

pub mod arena;
pub mod client;
pub mod config;
pub mod constants;
pub mod metrics;
pub mod net;
pub mod server;
pub mod sky;
pub mod util;
