//! Common types shared by the session pipeline crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
