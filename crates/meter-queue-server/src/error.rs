use meter_queue_core::TaskError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error(transparent)]
    UnknownTaskKind(#[from] TaskError),
}

pub type Result<T> = std::result::Result<T, InterpretError>;
