//! Configuration error types shared by the library crates and the binary

use thiserror::Error;

/// Common error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Environment variable {var}: {reason}")]
    Env { var: String, reason: String },
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
