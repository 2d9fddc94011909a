//! Error types shared by stores and the pool

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pool has been shut down")]
    Shutdown,

    #[error("timed out after {0:?} waiting for a store")]
    Timeout(Duration),

    #[error("checkout task was cancelled")]
    Cancelled,

    #[error("value at key {0:?} is not an integer")]
    NotNumeric(String),

    #[error("malformed entry at key {0:?}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
