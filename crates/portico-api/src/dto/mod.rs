//! Data Transfer Objects
//!
//! Request and response structures for the API.

pub mod admin;
pub mod auth;
pub mod common;
pub mod internal;
pub mod users;

pub use admin::*;
pub use auth::*;
pub use common::*;
pub use internal::*;
pub use users::*;
