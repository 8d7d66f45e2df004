//! Request extractors shared by the authenticated routes.

pub mod auth;
