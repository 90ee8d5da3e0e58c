use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Unknown task kind: {0}")]
    UnknownTaskKind(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
