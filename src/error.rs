//! Error types for the OCD link, console, and HEX loader.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcdError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("{op} exhausted its retry budget after {attempts} attempt(s)")]
    RetryBudgetExceeded { op: &'static str, attempts: u32 },

    #[error("can't {action}: CPU is not paused")]
    CpuNotPaused { action: &'static str },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("bad argument '{arg}': {reason}")]
    MalformedArgument { arg: String, reason: String },

    #[error("failed to read HEX file: {0}")]
    HexFile(std::io::Error),

    #[error("malformed HEX record at line {line}: {reason}")]
    HexSyntax { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, OcdError>;
