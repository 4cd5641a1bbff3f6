// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};

use provision_sys::{CommandSpec, mdstat::parse_detail_scan};
use provision_types::Stage;

use super::StageContext;
use crate::error::{ProvisionError, Result, StageResultExt};

const STAGE: Stage = Stage::Redundancy;

/// Assemble the RAID1 array from every payload partition. No-op for
/// single-device plans.
pub fn run(ctx: &StageContext<'_>) -> Result<()> {
    if !ctx.plan.redundancy_enabled() {
        tracing::info!("single device, no array to build");
        return Ok(());
    }

    let array = &ctx.config.array_device;
    let members = ctx.plan.payload_partitions();
    validate_members(ctx, &members)?;

    tracing::info!(array = %array.display(), members = members.len(), "creating RAID1 array");
    ctx.run(
        STAGE,
        CommandSpec::new("mdadm")
            .arg("--create")
            .path_arg(array)
            .arg("--level=1")
            .arg(format!("--raid-devices={}", members.len()))
            .arg("--metadata=1.2")
            .arg("--run")
            .args(members.iter().map(|member| member.as_os_str())),
    )?;

    let name = array
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    ctx.settle(STAGE, "array registration", || {
        ctx.host
            .md_arrays()
            .is_ok_and(|arrays| arrays.iter().any(|candidate| candidate.name == name))
            && ctx.host.path_exists(array)
    })?;

    persist_descriptor(ctx, array)
}

fn validate_members(ctx: &StageContext<'_>, members: &[PathBuf]) -> Result<()> {
    let arrays = ctx.host.md_arrays().in_stage(STAGE)?;

    for member in members {
        if !ctx.host.path_exists(member) {
            return Err(ProvisionError::stage(
                STAGE,
                format!("member {} does not exist", member.display()),
            ));
        }
        if let Some(array) = arrays.iter().find(|array| array.has_member(member)) {
            return Err(ProvisionError::stage(
                STAGE,
                format!("{} already belongs to {}", member.display(), array.name),
            ));
        }
        if ctx.host.is_mounted(member).in_stage(STAGE)? {
            return Err(ProvisionError::stage(
                STAGE,
                format!("{} is mounted", member.display()),
            ));
        }
    }
    Ok(())
}

/// Write the array's `ARRAY` line to the host config and to the staging
/// copy that later goes into the target.
fn persist_descriptor(ctx: &StageContext<'_>, array: &Path) -> Result<()> {
    let scan = ctx.run(STAGE, CommandSpec::new("mdadm").args(["--detail", "--scan"]))?;
    let descriptors = parse_detail_scan(&scan.stdout);

    let wanted = array.to_string_lossy();
    let mut lines: Vec<String> = descriptors
        .iter()
        .filter(|descriptor| descriptor.device == wanted)
        .map(|descriptor| descriptor.line.clone())
        .collect();
    if lines.is_empty() {
        tracing::warn!(array = %wanted, "array not listed by name in mdadm scan, keeping every entry");
        lines = descriptors.into_iter().map(|descriptor| descriptor.line).collect();
    }
    if lines.is_empty() {
        return Err(ProvisionError::stage(STAGE, "mdadm --detail --scan listed no arrays"));
    }

    let body = format!(
        "# Generated by provision on {}\n{}\n",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        lines.join("\n")
    );

    for path in [&ctx.config.host_array_config, &ctx.config.staged_array_config()] {
        write_with_parents(path, &body).in_stage(STAGE)?;
        tracing::info!(path = %path.display(), "array descriptor written");
    }
    Ok(())
}

fn write_with_parents(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)
}
