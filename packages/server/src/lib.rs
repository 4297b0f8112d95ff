//! Real-time chat and presence server.
//!
//! Clients connect over WebSocket, authenticate with an externally verified
//! identity, join public or private rooms, exchange messages and reactions,
//! and see live presence, typing and voice-channel rosters. Messages and users
//! are persisted to SQLite with an in-memory fallback.

pub mod config;

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
