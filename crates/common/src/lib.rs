//! Common types shared by the appointment watcher crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
