//! `SolSentry` HTTP server.
//!
//! Wires together the analysis core, the store, and the HTTP routes into a
//! running Axum server. Serves the JSON API at `/v1/*`.

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod worker;
