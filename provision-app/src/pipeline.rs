// SPDX-License-Identifier: GPL-3.0-only

//! Top-level orchestration of the three invocation modes

use provision_sys::{Host, Operator};
use provision_types::{MountTree, ProvisioningPlan, Stage};

use crate::chroot::ChrootSession;
use crate::cli::Mode;
use crate::config::InstallConfig;
use crate::control::RunControl;
use crate::error::{ProvisionError, Result};
use crate::prompt::{Credentials, collect_credentials, confirm_destruction};
use crate::stages::base_system::Bootstrapper;
use crate::stages::{
    StageContext, base_system, bootloader, encryption, filesystem, mount, partition, redundancy,
    secondary_context,
};
use crate::teardown::{self, TeardownReport};
use crate::{conflict, prober};

/// The outside world as seen by a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub host: &'a dyn Host,
    pub operator: &'a dyn Operator,
    pub bootstrapper: &'a dyn Bootstrapper,
}

#[derive(Debug)]
pub enum Outcome {
    /// `--show-plan`: the plan rendered as JSON.
    Plan(String),
    /// `--cleanup`: what teardown did and what it left behind.
    CleanedUp(TeardownReport),
    Installed,
}

pub fn execute(
    mode: Mode,
    config: &InstallConfig,
    env: Collaborators<'_>,
    control: &RunControl,
) -> Result<Outcome> {
    match mode {
        Mode::ShowPlan => {
            let plan = prober::probe(config, env.host)?;
            let json = plan.to_json().map_err(|error| {
                ProvisionError::Configuration(format!("cannot render plan: {error}"))
            })?;
            Ok(Outcome::Plan(json))
        }
        Mode::Cleanup => cleanup(config, env).map(Outcome::CleanedUp),
        Mode::Install { force } => install(config, force, env, control).map(|_| Outcome::Installed),
    }
}

fn require_privileges(host: &dyn Host) -> Result<()> {
    if host.is_privileged() {
        Ok(())
    } else {
        Err(ProvisionError::Configuration(
            "destructive modes must run as root".to_string(),
        ))
    }
}

fn cleanup(config: &InstallConfig, env: Collaborators<'_>) -> Result<TeardownReport> {
    require_privileges(env.host)?;
    if config.devices.is_empty() {
        return Err(ProvisionError::Configuration(
            "no target devices configured".to_string(),
        ));
    }

    confirm_destruction(env.operator, &config.devices, "Cleanup")?;

    let report = teardown::teardown(config, &config.devices, env.host);
    report.log_summary();
    Ok(report)
}

fn install(
    config: &InstallConfig,
    force: bool,
    env: Collaborators<'_>,
    control: &RunControl,
) -> Result<()> {
    require_privileges(env.host)?;
    let plan = prober::probe(config, env.host)?;

    let conflicts = conflict::scan(config, plan.devices(), env.host)?;
    if conflicts.has_conflict() {
        if force {
            tracing::warn!(
                "existing state will be torn down: {}",
                conflicts.summary()
            );
        } else {
            return conflicts.into_result();
        }
    }

    confirm_destruction(env.operator, plan.devices(), "Provisioning")?;
    let credentials = collect_credentials(config, env.operator)?;

    control.checkpoint()?;
    control.arm();

    match build(&plan, config, env, control, &credentials, conflicts.has_conflict()) {
        Ok(()) => {
            control.disarm();
            let unmount = teardown::safe_unmount(config, env.host);
            for failure in &unmount.failures {
                tracing::warn!("safe unmount step failed: {failure}");
            }
            tracing::info!(
                devices = plan.devices().len(),
                "provisioning complete"
            );
            Ok(())
        }
        Err(error) => {
            // A signal usually surfaces as a failing child; report the signal.
            let error = match control.stop_requested() {
                Some(signal) => ProvisionError::Interrupted(signal),
                None => error,
            };
            tracing::error!("{error}");

            if error.leaves_partial_state() {
                tracing::warn!("removing partially built storage stack");
                let report = teardown::teardown(config, plan.devices(), env.host);
                report.log_summary();
            }
            control.disarm();
            Err(error)
        }
    }
}

fn build(
    plan: &ProvisioningPlan,
    config: &InstallConfig,
    env: Collaborators<'_>,
    control: &RunControl,
    credentials: &Credentials,
    forced: bool,
) -> Result<()> {
    let ctx = StageContext {
        plan,
        config,
        host: env.host,
    };
    let tree = MountTree::from_plan(plan);

    if forced {
        let report = teardown::teardown(config, plan.devices(), env.host);
        report.log_summary();
    }

    enter(control, Stage::Partition)?;
    partition::run(&ctx)?;

    enter(control, Stage::Redundancy)?;
    redundancy::run(&ctx)?;

    enter(control, Stage::Encryption)?;
    let backing = encryption::run(&ctx, &credentials.encryption_passphrase)?;

    enter(control, Stage::Filesystem)?;
    filesystem::run(&ctx)?;

    enter(control, Stage::Mount)?;
    mount::run(&ctx, &tree)?;

    enter(control, Stage::BaseSystem)?;
    base_system::run(&ctx, &tree, env.bootstrapper)?;

    enter(control, Stage::SecondaryContext)?;
    let session = ChrootSession::open(config, env.host)?;
    secondary_context::run(&ctx, &session, &backing, credentials)?;

    enter(control, Stage::Bootloader)?;
    bootloader::run(&ctx, &session, &tree)?;

    session.close();
    control.checkpoint()
}

fn enter(control: &RunControl, stage: Stage) -> Result<()> {
    control.checkpoint()?;
    tracing::info!(%stage, "stage starting");
    Ok(())
}
