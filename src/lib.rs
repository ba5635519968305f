//! Session registry and cross-instance fan-out for WebSocket connections.

// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
pub mod telemetry;

// Core
pub mod connection;
pub mod dispatch;
pub mod distributor;
pub mod session;
pub mod transport;

// Application layer
pub mod api;
pub mod hub;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
