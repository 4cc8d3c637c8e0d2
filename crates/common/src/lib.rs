//! Shared types for the login gateway

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
