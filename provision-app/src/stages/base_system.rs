// SPDX-License-Identifier: GPL-3.0-only

//! Minimal distribution install plus the files the target needs to boot
//! its own storage stack.

use std::fs;
use std::path::Path;

use provision_sys::{CommandSpec, Host, Result as SysResult};
use provision_types::{Architecture, FstabContext, MountTree, Stage, render_fstab};

use super::StageContext;
use crate::error::{ProvisionError, Result, StageResultExt};
use crate::hostfiles;

const STAGE: Stage = Stage::BaseSystem;

/// Directories a usable root filesystem must contain after bootstrap.
pub const EXPECTED_DIRS: &[&str] = &["etc", "usr/bin", "usr/lib", "var"];

/// Populates an empty mounted root with a base distribution.
pub trait Bootstrapper {
    fn populate(
        &self,
        architecture: Architecture,
        distribution: &str,
        target: &Path,
        archive_url: &str,
    ) -> SysResult<()>;
}

/// `debootstrap` run on the live host.
pub struct Debootstrap<'a> {
    host: &'a dyn Host,
}

impl<'a> Debootstrap<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self { host }
    }
}

impl Bootstrapper for Debootstrap<'_> {
    fn populate(
        &self,
        architecture: Architecture,
        distribution: &str,
        target: &Path,
        archive_url: &str,
    ) -> SysResult<()> {
        self.host
            .run_checked(
                &CommandSpec::new("debootstrap")
                    .arg(format!("--arch={architecture}"))
                    .arg(distribution)
                    .path_arg(target)
                    .arg(archive_url),
            )
            .map(|_| ())
    }
}

pub fn run(ctx: &StageContext<'_>, tree: &MountTree, bootstrapper: &dyn Bootstrapper) -> Result<()> {
    let root = &ctx.config.target_root;
    let architecture = ctx.plan.architecture();
    let mirror = ctx.config.mirror_for(architecture);

    tracing::info!(
        distribution = %ctx.config.distribution,
        %architecture,
        %mirror,
        "bootstrapping base system"
    );
    bootstrapper
        .populate(architecture, &ctx.config.distribution, root, &mirror)
        .in_stage(STAGE)?;

    verify_root(root)?;
    write_fstab(ctx, tree)?;
    if ctx.plan.redundancy_enabled() {
        install_array_config(ctx)?;
    }
    hostfiles::write_all(ctx.config, root, &mirror).in_stage(STAGE)?;

    tracing::info!("base system ready");
    Ok(())
}

fn verify_root(root: &Path) -> Result<()> {
    let missing: Vec<&str> = EXPECTED_DIRS
        .iter()
        .copied()
        .filter(|dir| !root.join(dir).is_dir())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::stage(
            STAGE,
            format!("bootstrapped root is missing {}", missing.join(", ")),
        ))
    }
}

fn write_fstab(ctx: &StageContext<'_>, tree: &MountTree) -> Result<()> {
    let mapping = ctx.config.mapping_device();
    let boot = ctx.plan.boot_partition(ctx.plan.primary_device());

    let btrfs_uuid = required_uuid(ctx, &mapping)?;
    let boot_uuid = required_uuid(ctx, &boot)?;

    let fstab = render_fstab(
        tree,
        &FstabContext {
            btrfs_uuid,
            boot_uuid,
            swap_enabled: ctx.plan.swap_enabled(),
        },
    );
    hostfiles::write(&ctx.config.target_root, "etc/fstab", &fstab).in_stage(STAGE)
}

fn install_array_config(ctx: &StageContext<'_>) -> Result<()> {
    let staged = ctx.config.staged_array_config();
    let descriptor = fs::read_to_string(&staged).map_err(|error| {
        ProvisionError::stage(
            STAGE,
            format!("array descriptor {} unreadable: {error}", staged.display()),
        )
    })?;
    hostfiles::write(&ctx.config.target_root, "etc/mdadm/mdadm.conf", &descriptor).in_stage(STAGE)
}

fn required_uuid(ctx: &StageContext<'_>, node: &Path) -> Result<String> {
    ctx.host
        .uuid_of(node)
        .in_stage(STAGE)?
        .ok_or_else(|| ProvisionError::stage(STAGE, format!("no UUID for {}", node.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_root_names_every_missing_dir() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        fs::create_dir_all(root.path().join("var")).unwrap();

        let error = verify_root(root.path()).unwrap_err().to_string();
        assert!(error.contains("usr/bin, usr/lib"), "{error}");

        fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        fs::create_dir_all(root.path().join("usr/lib")).unwrap();
        assert!(verify_root(root.path()).is_ok());
    }
}
