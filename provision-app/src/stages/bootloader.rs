// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use provision_sys::CommandSpec;
use provision_types::{MountTree, Stage};

use super::StageContext;
use super::secondary_context::require_boot_essentials;
use crate::chroot::{ChrootSession, scripts};
use crate::error::{ProvisionError, Result};

const STAGE: Stage = Stage::Bootloader;

/// Install GRUB on the primary ESP, then on every other member's ESP so any
/// single disk can boot the mirror.
pub fn run(ctx: &StageContext<'_>, session: &ChrootSession<'_>, tree: &MountTree) -> Result<()> {
    require_boot_essentials(session.root())?;

    let boot = tree
        .boot()
        .ok_or_else(|| ProvisionError::stage(STAGE, "mount tree has no boot binding"))?;
    let mount_point = boot.target(&ctx.config.target_root);
    let target = ctx.plan.bootloader_target();

    session.run_script(&scripts::bootloader(target, false))?;
    tracing::info!(device = %ctx.plan.primary_device().display(), "bootloader installed");

    let secondaries = &ctx.plan.devices()[1..];
    if secondaries.is_empty() {
        return Ok(());
    }

    let primary_esp = ctx.plan.boot_partition(ctx.plan.primary_device());
    let options = boot.options();
    for device in secondaries {
        let esp = ctx.plan.boot_partition(device);
        swap_esp(ctx, &mount_point, &esp, &options)?;
        session.run_script(&scripts::bootloader(target, true))?;
        tracing::info!(device = %device.display(), "fallback bootloader installed");
    }
    swap_esp(ctx, &mount_point, &primary_esp, &options)
}

fn swap_esp(ctx: &StageContext<'_>, mount_point: &Path, esp: &Path, options: &str) -> Result<()> {
    ctx.run(STAGE, CommandSpec::new("umount").path_arg(mount_point))?;
    ctx.run(
        STAGE,
        CommandSpec::new("mount")
            .arg("-o")
            .arg(options)
            .path_arg(esp)
            .path_arg(mount_point),
    )?;
    Ok(())
}
