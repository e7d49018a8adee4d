//! Collaborative note relay: a WebSocket server that groups peers by note id
//! and forwards their edits, plus the client that keeps a local note book in
//! sync through it.

pub mod config;
pub mod models;
pub mod relay;
pub mod state;
pub mod websocket;
pub mod handlers;
pub mod routes;
pub mod docs;
pub mod client;
