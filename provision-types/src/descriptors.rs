// SPDX-License-Identifier: GPL-3.0-only

//! Text of the files written into the installed system so it can find,
//! unlock and mount its own storage stack.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use crate::mount_tree::{MountSource, MountTree};

pub const SWAP_FILE_PATH: &str = "/swap/swapfile";

pub const GRUB_FRAGMENT_PATH: &str = "etc/default/grub.d/60-provision-cryptodisk.cfg";

/// Block device that carries the LUKS header: the array or the raw partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackingDevice {
    pub path: PathBuf,
    pub uuid: String,
}

/// UUIDs needed to describe the mounted tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabContext {
    pub btrfs_uuid: String,
    pub boot_uuid: String,
    pub swap_enabled: bool,
}

pub fn render_fstab(tree: &MountTree, context: &FstabContext) -> String {
    let mut out = String::from("# <file system> <mount point> <type> <options> <dump> <pass>\n");

    for binding in tree.bindings() {
        let line = match &binding.source {
            MountSource::Subvolume { .. } => format!(
                "UUID={} {} btrfs {} 0 0",
                context.btrfs_uuid,
                binding.path,
                binding.options()
            ),
            MountSource::BootPartition { .. } => format!(
                "UUID={} {} vfat {} 0 1",
                context.boot_uuid,
                binding.path,
                binding.options()
            ),
        };
        let _ = writeln!(out, "{line}");
    }

    if context.swap_enabled {
        let _ = writeln!(out, "{SWAP_FILE_PATH} none swap defaults 0 0");
    }

    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrypttabEntry {
    pub mapping: String,
    pub backing_uuid: String,
}

impl CrypttabEntry {
    pub fn new(mapping: impl Into<String>, backing: &BackingDevice) -> Self {
        Self {
            mapping: mapping.into(),
            backing_uuid: backing.uuid.clone(),
        }
    }
}

pub fn render_crypttab(entry: &CrypttabEntry) -> String {
    format!(
        "{} UUID={} none luks,discard\n",
        entry.mapping, entry.backing_uuid
    )
}

/// Drop-in that lets GRUB unlock the container and points the kernel at the
/// root subvolume.
pub fn render_grub_fragment(entry: &CrypttabEntry) -> String {
    format!(
        "GRUB_ENABLE_CRYPTODISK=y\n\
         GRUB_CMDLINE_LINUX=\"$GRUB_CMDLINE_LINUX cryptdevice=UUID={uuid}:{mapping} root=/dev/mapper/{mapping} rootflags=subvol=@\"\n",
        uuid = entry.backing_uuid,
        mapping = entry.mapping,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Architecture;
    use crate::plan::ProvisioningPlan;

    fn tree(swap: u64) -> MountTree {
        let plan =
            ProvisioningPlan::new(vec![PathBuf::from("/dev/sda")], Architecture::Amd64, swap)
                .unwrap();
        MountTree::from_plan(&plan)
    }

    fn context(swap_enabled: bool) -> FstabContext {
        FstabContext {
            btrfs_uuid: "b7f0".to_string(),
            boot_uuid: "1A2B-3C4D".to_string(),
            swap_enabled,
        }
    }

    #[test]
    fn fstab_without_swap_has_no_swap_line() {
        let text = render_fstab(&tree(0), &context(false));
        assert!(text.contains("UUID=b7f0 / btrfs subvol=@,compress=zstd,noatime 0 0"));
        assert!(text.contains("UUID=1A2B-3C4D /boot/efi vfat umask=0077 0 1"));
        assert!(!text.contains("swap"));
    }

    #[test]
    fn fstab_with_swap_mounts_subvolume_and_file() {
        let text = render_fstab(&tree(16), &context(true));
        assert!(text.contains("UUID=b7f0 /swap btrfs subvol=@swap,noatime 0 0"));
        assert!(text.ends_with("/swap/swapfile none swap defaults 0 0\n"));
    }

    #[test]
    fn crypttab_and_grub_reference_backing_uuid() {
        let backing = BackingDevice {
            path: PathBuf::from("/dev/md0"),
            uuid: "0f1e".to_string(),
        };
        let entry = CrypttabEntry::new("cryptroot", &backing);

        assert_eq!(render_crypttab(&entry), "cryptroot UUID=0f1e none luks,discard\n");
        let grub = render_grub_fragment(&entry);
        assert!(grub.starts_with("GRUB_ENABLE_CRYPTODISK=y\n"));
        assert!(grub.contains(
            "cryptdevice=UUID=0f1e:cryptroot root=/dev/mapper/cryptroot rootflags=subvol=@"
        ));
    }
}
