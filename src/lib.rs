//! Choretrack: a per-user chore tracker served over REST and WebSocket.

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod notify;
pub mod photos;
pub mod repository;
pub mod server;
