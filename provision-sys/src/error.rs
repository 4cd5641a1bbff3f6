// SPDX-License-Identifier: GPL-3.0-only

use std::time::Duration;

use thiserror::Error;

/// Error types for host-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("required tool not found: {0}")]
    ToolMissing(String),

    #[error("timed out after {:?} waiting for {what}", .waited)]
    Timeout { what: String, waited: Duration },

    #[error("could not parse {source_name}: {line}")]
    Parse { source_name: String, line: String },
}

/// Result type alias for host operations
pub type Result<T> = std::result::Result<T, SysError>;
