//! Harmonia API server library.
//!
//! Config, state, error handling, identity resolution, routes and the
//! realtime channel, shared by the binary entrypoint and the integration
//! tests.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod state;
pub mod ws;
