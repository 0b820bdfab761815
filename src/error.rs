use argon2::Error as Argon2Error;
use figment::Error as ConfigError;
use serde_json::Error as JsonError;
use std::io::Error as IoError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Config(#[from] Box<ConfigError>),
    #[error("Logging setup failed: {0}")]
    Logging(String),
    #[error("Storage unavailable: {0}")]
    Storage(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(Box::new(err))
    }
}
