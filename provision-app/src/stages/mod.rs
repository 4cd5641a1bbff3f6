// SPDX-License-Identifier: GPL-3.0-only

//! Construction stages, run in order by the pipeline

pub mod base_system;
pub mod bootloader;
pub mod encryption;
pub mod filesystem;
pub mod mount;
pub mod partition;
pub mod redundancy;
pub mod secondary_context;

use provision_sys::{CommandOutcome, CommandSpec, Host, wait_until};
use provision_types::{ProvisioningPlan, Stage};

use crate::config::InstallConfig;
use crate::error::{Result, StageResultExt};

/// What every stage gets to work with.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub plan: &'a ProvisioningPlan,
    pub config: &'a InstallConfig,
    pub host: &'a dyn Host,
}

impl StageContext<'_> {
    /// Run a command; a non-zero exit fails `stage`.
    pub fn run(&self, stage: Stage, spec: CommandSpec) -> Result<CommandOutcome> {
        self.host.run_checked(&spec).in_stage(stage)
    }

    /// Poll `ready` for up to the configured settle timeout.
    pub fn settle(&self, stage: Stage, what: &str, ready: impl FnMut() -> bool) -> Result<()> {
        wait_until(what, self.config.settle_timeout, ready).in_stage(stage)
    }
}
