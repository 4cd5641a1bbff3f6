// SPDX-License-Identifier: GPL-3.0-only

//! Packages, boot descriptors and the login user, configured from inside the
//! target root.

use std::fs;
use std::path::Path;

use provision_types::{
    BackingDevice, CrypttabEntry, GRUB_FRAGMENT_PATH, Stage, render_crypttab,
    render_grub_fragment,
};

use super::StageContext;
use crate::chroot::{ChrootSession, scripts};
use crate::error::{ProvisionError, Result, StageResultExt};
use crate::hostfiles;
use crate::prompt::Credentials;

const STAGE: Stage = Stage::SecondaryContext;

pub fn run(
    ctx: &StageContext<'_>,
    session: &ChrootSession<'_>,
    backing: &BackingDevice,
    credentials: &Credentials,
) -> Result<()> {
    let root = session.root();

    // Both must exist before the initramfs and grub.cfg are generated.
    let entry = CrypttabEntry::new(ctx.config.mapping_name.clone(), backing);
    hostfiles::write(root, "etc/crypttab", &render_crypttab(&entry)).in_stage(STAGE)?;
    hostfiles::write(root, GRUB_FRAGMENT_PATH, &render_grub_fragment(&entry)).in_stage(STAGE)?;

    let packages = session.run_script(&scripts::packages(ctx.config, ctx.plan));
    if let Err(error) = packages {
        if boot_essentials_present(root) {
            tracing::warn!("package script reported failure but a kernel and GRUB are installed: {error}");
        } else {
            return Err(error);
        }
    }

    session.run_script(&scripts::users(
        ctx.config,
        credentials.user_password.expose(),
    ))?;

    tracing::info!(user = %ctx.config.username, "target configured");
    Ok(())
}

/// A kernel module tree and grub-install are what the remaining stages need.
pub fn boot_essentials_present(root: &Path) -> bool {
    let has_kernel = fs::read_dir(root.join("lib/modules"))
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    has_kernel && root.join("usr/sbin/grub-install").is_file()
}

/// Turn a missing essential into an error naming what is absent.
pub fn require_boot_essentials(root: &Path) -> Result<()> {
    if boot_essentials_present(root) {
        Ok(())
    } else {
        Err(ProvisionError::SecondaryContext(format!(
            "{} has no kernel modules or grub-install",
            root.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essentials_need_kernel_and_grub() {
        let root = tempfile::tempdir().unwrap();
        assert!(!boot_essentials_present(root.path()));

        fs::create_dir_all(root.path().join("lib/modules")).unwrap();
        fs::create_dir_all(root.path().join("usr/sbin")).unwrap();
        fs::write(root.path().join("usr/sbin/grub-install"), "").unwrap();
        assert!(!boot_essentials_present(root.path()), "empty module tree");

        fs::create_dir_all(root.path().join("lib/modules/6.8.0-31-generic")).unwrap();
        assert!(boot_essentials_present(root.path()));
        assert!(require_boot_essentials(root.path()).is_ok());
    }
}
