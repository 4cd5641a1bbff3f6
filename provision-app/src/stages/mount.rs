// SPDX-License-Identifier: GPL-3.0-only

use std::fs::{self, File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use provision_sys::CommandSpec;
use provision_types::{MountSource, MountTree, Stage, Subvolume};

use super::StageContext;
use crate::error::{Result, StageResultExt};

const STAGE: Stage = Stage::Mount;

/// Mount the tree in order, then activate the swap file if one is planned.
pub fn run(ctx: &StageContext<'_>, tree: &MountTree) -> Result<()> {
    let root = &ctx.config.target_root;

    for binding in tree.bindings() {
        let target = binding.target(root);
        // Children's mount points only exist once the parent is mounted.
        fs::create_dir_all(&target).in_stage(STAGE)?;

        let source = match &binding.source {
            MountSource::Subvolume { .. } => ctx.config.mapping_device(),
            MountSource::BootPartition { partition } => partition.clone(),
        };

        ctx.run(
            STAGE,
            CommandSpec::new("mount")
                .arg("-o")
                .arg(binding.options())
                .path_arg(&source)
                .path_arg(&target),
        )?;
        tracing::info!(target = %target.display(), "mounted");
    }

    if ctx.plan.swap_enabled() {
        activate_swap(ctx)?;
    }
    Ok(())
}

pub fn swap_file(ctx: &StageContext<'_>) -> PathBuf {
    ctx.config
        .target_root
        .join(Subvolume::Swap.mount_path().trim_start_matches('/'))
        .join("swapfile")
}

fn activate_swap(ctx: &StageContext<'_>) -> Result<()> {
    let path = swap_file(ctx);
    let size = format!("{}G", ctx.plan.swap_size_gib());

    File::create(&path).in_stage(STAGE)?;

    let no_cow = ctx
        .host
        .run(&CommandSpec::new("chattr").arg("+C").path_arg(&path));
    match no_cow {
        Ok(outcome) if outcome.success() => {}
        Ok(outcome) => tracing::warn!(
            "chattr +C on {} failed, swap file may be copy-on-write: {}",
            path.display(),
            outcome.stderr.trim()
        ),
        Err(error) => tracing::warn!("chattr unavailable: {error}"),
    }

    ctx.run(
        STAGE,
        CommandSpec::new("fallocate")
            .arg("-l")
            .arg(&size)
            .path_arg(&path),
    )?;
    fs::set_permissions(&path, Permissions::from_mode(0o600)).in_stage(STAGE)?;
    ctx.run(STAGE, CommandSpec::new("mkswap").path_arg(&path))?;
    ctx.run(STAGE, CommandSpec::new("swapon").path_arg(&path))?;

    tracing::info!(path = %path.display(), %size, "swap active");
    Ok(())
}
