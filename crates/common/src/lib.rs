//! Common types shared by the docgate crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
