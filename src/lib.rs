//! Networked American checkers
//!

/// Rules engine: board, pieces, legal actions
pub mod checkers;

/// Packet framing, payload layouts and stream encryption
pub mod protocol;

/// Event bus shared by server and clients
pub mod events;

/// Framed event streams and LAN discovery
pub mod network;

/// Authoritative game server
pub mod server;

/// Game client mirroring the server state
pub mod client;

/// Minimax search and the machine player
pub mod ai;

/// Runtime configuration
pub mod config;
