//! Error types for MiniKV
//!
//! Defines a unified error type shared by the script parser, the driver, and
//! the TCP front end. Concurrency-control conditions (lock conflicts,
//! recovering replicas, waitlisting, aborts) are *not* errors: they are
//! ordinary outcomes of the protocol and surface to users as status lines.

use std::fmt;
use std::io;

/// Unified error type for MiniKV operations
#[derive(Debug)]
pub enum MiniKvError {
    /// I/O error (script files, network)
    Io(io::Error),
    /// Command syntax error
    Syntax(String),
    /// JSON-related error (dump rendering)
    Json(String),
    /// Generic internal error
    Internal(String),
}

impl MiniKvError {
    /// Create an "unknown command" syntax error
    pub fn unknown_command(name: &str) -> Self {
        MiniKvError::Syntax(format!("Unknown command '{}'", name))
    }

    /// Create a "bad variable name" syntax error; valid names are x1..x20
    pub fn bad_variable(name: &str) -> Self {
        MiniKvError::Syntax(format!(
            "Bad variable '{}', expected x1..x{}",
            name,
            crate::types::VARIABLE_COUNT
        ))
    }

    /// Create an argument-count syntax error for a command
    pub fn bad_arity(command: &str, expected: usize, got: usize) -> Self {
        MiniKvError::Syntax(format!(
            "Command '{}' takes {} argument(s), got {}",
            command, expected, got
        ))
    }
}

impl fmt::Display for MiniKvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiniKvError::Io(e) => write!(f, "{}", e),
            MiniKvError::Syntax(msg) => write!(f, "{}", msg),
            MiniKvError::Json(msg) => write!(f, "{}", msg),
            MiniKvError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MiniKvError {}

impl From<io::Error> for MiniKvError {
    fn from(e: io::Error) -> Self {
        MiniKvError::Io(e)
    }
}

impl From<serde_json::Error> for MiniKvError {
    fn from(e: serde_json::Error) -> Self {
        MiniKvError::Json(e.to_string())
    }
}

/// Result type alias for MiniKV operations
pub type Result<T> = std::result::Result<T, MiniKvError>;
