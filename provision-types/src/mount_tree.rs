// SPDX-License-Identifier: GPL-3.0-only

//! Ordered bindings of subvolumes and the boot partition onto the target root

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::plan::ProvisioningPlan;
use crate::subvolume::Subvolume;

pub const BOOT_MOUNT_PATH: &str = "/boot/efi";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MountSource {
    Subvolume { subvolume: Subvolume },
    BootPartition { partition: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountBinding {
    pub source: MountSource,
    /// Path relative to the target root, always starting with `/`.
    pub path: String,
}

impl MountBinding {
    /// Absolute path of this binding below `root`.
    pub fn target(&self, root: &Path) -> PathBuf {
        let relative = self.path.trim_start_matches('/');
        if relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(relative)
        }
    }

    pub fn options(&self) -> String {
        match &self.source {
            MountSource::Subvolume { subvolume } => subvolume.mount_options(),
            MountSource::BootPartition { .. } => "umask=0077".to_string(),
        }
    }

    pub fn subvolume(&self) -> Option<Subvolume> {
        match &self.source {
            MountSource::Subvolume { subvolume } => Some(*subvolume),
            MountSource::BootPartition { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountTree {
    bindings: Vec<MountBinding>,
}

impl MountTree {
    pub fn from_plan(plan: &ProvisioningPlan) -> Self {
        let mut bindings: Vec<MountBinding> = Subvolume::for_swap_size(plan.swap_size_gib())
            .into_iter()
            .map(|subvolume| MountBinding {
                source: MountSource::Subvolume { subvolume },
                path: subvolume.mount_path().to_string(),
            })
            .collect();

        bindings.push(MountBinding {
            source: MountSource::BootPartition {
                partition: plan.boot_partition(plan.primary_device()),
            },
            path: BOOT_MOUNT_PATH.to_string(),
        });

        Self { bindings }
    }

    /// Bindings in mount order, root first.
    pub fn bindings(&self) -> &[MountBinding] {
        &self.bindings
    }

    /// Bindings in unmount order, the exact reverse of mount order.
    #[cfg(test)]
    fn unwind_order(&self) -> impl Iterator<Item = &MountBinding> {
        self.bindings.iter().rev()
    }

    pub fn boot(&self) -> Option<&MountBinding> {
        self.bindings
            .iter()
            .find(|binding| matches!(binding.source, MountSource::BootPartition { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Architecture;

    fn plan(swap: u64) -> ProvisioningPlan {
        ProvisioningPlan::new(
            vec![PathBuf::from("/dev/vda"), PathBuf::from("/dev/vdb")],
            Architecture::Amd64,
            swap,
        )
        .unwrap()
    }

    #[test]
    fn root_first_boot_last() {
        let tree = MountTree::from_plan(&plan(4));
        let paths: Vec<&str> = tree.bindings().iter().map(|b| b.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/", "/home", "/var", "/.snapshots", "/swap", "/boot/efi"]
        );
        assert_eq!(
            tree.boot().map(|b| b.source.clone()),
            Some(MountSource::BootPartition {
                partition: PathBuf::from("/dev/vda1")
            })
        );
    }

    #[test]
    fn unwind_order_is_exact_reverse() {
        let tree = MountTree::from_plan(&plan(0));
        let forward: Vec<_> = tree.bindings().iter().collect();
        let mut backward: Vec<_> = tree.unwind_order().collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(tree.unwind_order().next().map(|b| b.path.as_str()), Some("/boot/efi"));
        assert_eq!(tree.unwind_order().last().map(|b| b.path.as_str()), Some("/"));
    }

    #[test]
    fn binding_targets_live_under_root() {
        let tree = MountTree::from_plan(&plan(0));
        let root = Path::new("/mnt");
        assert_eq!(tree.bindings()[0].target(root), PathBuf::from("/mnt"));
        assert_eq!(tree.bindings()[3].target(root), PathBuf::from("/mnt/.snapshots"));
    }
}
