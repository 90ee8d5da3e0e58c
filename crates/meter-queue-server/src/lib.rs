pub mod config;
pub mod error;
pub mod ingest;
pub mod interpreter;

pub use config::ServerConfig;
pub use error::{InterpretError, Result};
pub use ingest::{IngestReport, Ingestor};
pub use interpreter::MessageInterpreter;
