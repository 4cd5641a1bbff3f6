// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use provision_sys::SysError;
use provision_types::{PlanError, Stage};
use thiserror::Error;

/// Signals that stop a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSignal {
    Interrupt,
    Terminate,
}

impl InterruptSignal {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Interrupt => 130,
            Self::Terminate => 143,
        }
    }
}

impl fmt::Display for InterruptSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        })
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("target devices already carry storage state ({0}); run with --cleanup first or pass --force")]
    Conflict(String),

    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("script inside the target root failed: {0}")]
    SecondaryContext(String),

    #[error("aborted by operator, no device was touched")]
    Cancelled,

    #[error("interrupted by {0}")]
    Interrupted(InterruptSignal),
}

impl ProvisionError {
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }

    /// Whether reaching this error after arming leaves devices half built.
    pub fn leaves_partial_state(&self) -> bool {
        matches!(
            self,
            Self::Stage { .. } | Self::SecondaryContext(_) | Self::Interrupted(_)
        )
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Interrupted(signal) => signal.exit_code(),
            _ => 1,
        }
    }
}

impl From<PlanError> for ProvisionError {
    fn from(error: PlanError) -> Self {
        Self::Configuration(error.to_string())
    }
}

/// Attach the failing stage to a lower-level error.
pub trait StageResultExt<T> {
    fn in_stage(self, stage: Stage) -> Result<T, ProvisionError>;
}

impl<T> StageResultExt<T> for Result<T, SysError> {
    fn in_stage(self, stage: Stage) -> Result<T, ProvisionError> {
        self.map_err(|error| ProvisionError::stage(stage, error.to_string()))
    }
}

impl<T> StageResultExt<T> for std::io::Result<T> {
    fn in_stage(self, stage: Stage) -> Result<T, ProvisionError> {
        self.map_err(|error| ProvisionError::stage(stage, error.to_string()))
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
