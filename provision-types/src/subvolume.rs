// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use serde::{Deserialize, Serialize};

/// btrfs subvolumes created on the root filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subvolume {
    Root,
    Home,
    Var,
    Snapshots,
    Swap,
}

impl Subvolume {
    /// Creation and mount order. `Swap` is filtered out when swap is disabled.
    pub const ALL: [Subvolume; 5] = [
        Subvolume::Root,
        Subvolume::Home,
        Subvolume::Var,
        Subvolume::Snapshots,
        Subvolume::Swap,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Root => "@",
            Self::Home => "@home",
            Self::Var => "@var",
            Self::Snapshots => "@snapshots",
            Self::Swap => "@swap",
        }
    }

    /// Mount point relative to the target root.
    pub fn mount_path(self) -> &'static str {
        match self {
            Self::Root => "/",
            Self::Home => "/home",
            Self::Var => "/var",
            Self::Snapshots => "/.snapshots",
            Self::Swap => "/swap",
        }
    }

    /// Copy-on-write files (swap) must not be compressed.
    pub fn compressed(self) -> bool {
        !matches!(self, Self::Swap)
    }

    pub fn mount_options(self) -> String {
        let mut options = vec![format!("subvol={}", self.name())];
        if self.compressed() {
            options.push("compress=zstd".to_string());
        }
        options.push("noatime".to_string());
        options.join(",")
    }

    /// Subvolumes for a plan with the given swap size.
    pub fn for_swap_size(swap_size_gib: u64) -> Vec<Subvolume> {
        Self::ALL
            .into_iter()
            .filter(|subvolume| *subvolume != Self::Swap || swap_size_gib > 0)
            .collect()
    }
}

impl fmt::Display for Subvolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_subvolume_exists_only_with_swap() {
        assert!(!Subvolume::for_swap_size(0).contains(&Subvolume::Swap));
        assert_eq!(Subvolume::for_swap_size(0).len(), 4);
        assert_eq!(Subvolume::for_swap_size(8).last(), Some(&Subvolume::Swap));
    }

    #[test]
    fn swap_is_never_compressed() {
        assert_eq!(Subvolume::Swap.mount_options(), "subvol=@swap,noatime");
        assert_eq!(
            Subvolume::Root.mount_options(),
            "subvol=@,compress=zstd,noatime"
        );
        assert_eq!(Subvolume::Snapshots.mount_path(), "/.snapshots");
    }
}
