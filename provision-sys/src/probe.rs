// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use crate::command::CommandRunner;
use crate::devmapper::DmMapping;
use crate::error::Result;
use crate::mdstat::MdArray;
use crate::mountinfo::MountEntry;

/// Side-effect-free reads of live kernel state.
///
/// Every method re-reads its source; callers must not cache the answers
/// across a destructive step.
pub trait HostProbe {
    /// Mount table in kernel order.
    fn mounts(&self) -> Result<Vec<MountEntry>>;

    fn md_arrays(&self) -> Result<Vec<MdArray>>;

    fn mappings(&self) -> Result<Vec<DmMapping>>;

    /// Active swap areas.
    fn swaps(&self) -> Result<Vec<PathBuf>>;

    /// Partition nodes of a whole-disk device, ordered by partition number.
    fn partitions_of(&self, device: &Path) -> Result<Vec<PathBuf>>;

    /// Signature types (`gpt`, `linux_raid_member`, `crypto_LUKS`, ...) found on a node.
    fn signatures(&self, node: &Path) -> Result<Vec<String>>;

    fn uuid_of(&self, node: &Path) -> Result<Option<String>>;

    fn size_bytes(&self, device: &Path) -> Result<u64>;

    fn path_exists(&self, path: &Path) -> bool;

    fn is_block_device(&self, path: &Path) -> bool;

    fn tool_available(&self, tool: &str) -> bool;

    fn is_privileged(&self) -> bool;

    fn mapping_active(&self, name: &str) -> Result<bool> {
        Ok(self.path_exists(&Path::new("/dev/mapper").join(name))
            || self.mappings()?.iter().any(|mapping| mapping.name == name))
    }

    fn is_mounted(&self, source: &Path) -> Result<bool> {
        let source = source.to_string_lossy();
        Ok(self.mounts()?.iter().any(|entry| entry.source == source))
    }
}

/// Everything the provisioner needs from the machine it runs on.
pub trait Host: CommandRunner + HostProbe {
    /// Kill processes holding paths below `root`. Returns how many were signalled.
    fn release_holders(&self, root: &Path) -> usize;
}
