// SPDX-License-Identifier: GPL-3.0-only

use std::fs;

use provision_sys::CommandSpec;
use provision_types::{Stage, Subvolume};

use super::StageContext;
use crate::error::{Result, StageResultExt};

const STAGE: Stage = Stage::Filesystem;

/// FAT32 on every boot partition, btrfs on the mapping, then the subvolumes.
pub fn run(ctx: &StageContext<'_>) -> Result<()> {
    for boot in ctx.plan.boot_partitions() {
        ctx.run(
            STAGE,
            CommandSpec::new("mkfs.vfat")
                .args(["-F", "32", "-n", "EFI"])
                .path_arg(&boot),
        )?;
    }

    let mapping = ctx.config.mapping_device();
    ctx.run(
        STAGE,
        CommandSpec::new("mkfs.btrfs")
            .args(["-f", "-L", "root"])
            .path_arg(&mapping),
    )?;

    let subvolumes = Subvolume::for_swap_size(ctx.plan.swap_size_gib());
    create_subvolumes(ctx, &subvolumes)?;

    tracing::info!(subvolumes = subvolumes.len(), "filesystems created");
    Ok(())
}

/// Mount the top-level volume at the target root just long enough to create
/// the subvolumes. The mount is released whether or not creation succeeds.
fn create_subvolumes(ctx: &StageContext<'_>, subvolumes: &[Subvolume]) -> Result<()> {
    let root = &ctx.config.target_root;
    fs::create_dir_all(root).in_stage(STAGE)?;

    ctx.run(
        STAGE,
        CommandSpec::new("mount")
            .path_arg(&ctx.config.mapping_device())
            .path_arg(root),
    )?;

    let created = subvolumes.iter().try_for_each(|subvolume| {
        ctx.run(
            STAGE,
            CommandSpec::new("btrfs")
                .args(["subvolume", "create"])
                .path_arg(&root.join(subvolume.name())),
        )
        .map(|_| ())
    });

    let released = ctx.run(STAGE, CommandSpec::new("umount").path_arg(root));

    created?;
    released.map(|_| ())
}
