//! Repository implementations

mod client;
mod reset_token;
mod user;
mod verification;

pub use client::ApiClientRepo;
pub use reset_token::ResetTokenRepo;
pub use user::UserRepo;
pub use verification::CodeRepo;
