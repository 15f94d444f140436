//! API Handlers
//!
//! Request handlers for all API endpoints.
//! Each module handles a specific surface.

pub mod admin;
pub mod auth;
pub mod health;
pub mod internal;
pub mod users;
