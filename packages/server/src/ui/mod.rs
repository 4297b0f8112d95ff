//! Chat server: WebSocket and HTTP entry points.

pub mod connection;
mod handler;
mod server;
mod signal;
pub mod state;

pub use connection::ConnectionController;
pub use server::Server;
pub use state::{AppState, DEFAULT_OUTBOUND_QUEUE};
