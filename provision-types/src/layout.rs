// SPDX-License-Identifier: GPL-3.0-only

//! Fixed GPT layout written to every target device

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;

/// Boot partition starts on the first 1 MiB boundary.
pub const BOOT_PARTITION_OFFSET_BYTES: u64 = MIB;

pub const BOOT_PARTITION_SIZE_BYTES: u64 = 512 * MIB;

const SECTOR_BYTES: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionRole {
    /// EFI system partition
    Boot,
    /// Member of the mirrored array
    RaidMember,
    /// Plain data partition holding the encrypted container directly
    Data,
}

impl PartitionRole {
    /// sgdisk type code
    pub fn type_code(self) -> &'static str {
        match self {
            Self::Boot => "ef00",
            Self::RaidMember => "fd00",
            Self::Data => "8300",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Boot => "EFI",
            Self::RaidMember => "raid",
            Self::Data => "root",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub number: u32,
    pub role: PartitionRole,
    /// Start offset in bytes, `None` means the first free aligned sector.
    pub start_bytes: Option<u64>,
    /// Size in bytes, `None` spans the rest of the device.
    pub size_bytes: Option<u64>,
}

impl PartitionSpec {
    /// Value for `sgdisk --new`.
    pub fn sgdisk_new(&self) -> String {
        let start = self
            .start_bytes
            .map(|bytes| (bytes / SECTOR_BYTES).to_string())
            .unwrap_or_else(|| "0".to_string());
        let end = self
            .size_bytes
            .map(|bytes| format!("+{}M", bytes / MIB))
            .unwrap_or_else(|| "0".to_string());
        format!("{}:{}:{}", self.number, start, end)
    }

    pub fn sgdisk_type(&self) -> String {
        format!("{}:{}", self.number, self.role.type_code())
    }

    pub fn sgdisk_name(&self) -> String {
        format!("{}:{}", self.number, self.role.label())
    }
}

/// The two partitions created on every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLayout {
    pub partitions: Vec<PartitionSpec>,
}

impl PartitionLayout {
    pub fn new(redundancy_enabled: bool) -> Self {
        let second_role = if redundancy_enabled {
            PartitionRole::RaidMember
        } else {
            PartitionRole::Data
        };

        Self {
            partitions: vec![
                PartitionSpec {
                    number: 1,
                    role: PartitionRole::Boot,
                    start_bytes: Some(BOOT_PARTITION_OFFSET_BYTES),
                    size_bytes: Some(BOOT_PARTITION_SIZE_BYTES),
                },
                PartitionSpec {
                    number: 2,
                    role: second_role,
                    start_bytes: None,
                    size_bytes: None,
                },
            ],
        }
    }

    pub fn boot(&self) -> &PartitionSpec {
        &self.partitions[0]
    }

    pub fn payload(&self) -> &PartitionSpec {
        &self.partitions[1]
    }
}

/// Kernel node name of partition `number` on `device`.
///
/// Devices whose name ends in a digit (`nvme0n1`, `mmcblk0`, `loop3`) get a `p`
/// separator.
pub fn partition_path(device: &Path, number: u32) -> PathBuf {
    let raw = device.to_string_lossy();
    let separator = if raw.ends_with(|c: char| c.is_ascii_digit()) {
        "p"
    } else {
        ""
    };
    PathBuf::from(format!("{raw}{separator}{number}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_partition_is_identical_regardless_of_payload_role() {
        let single = PartitionLayout::new(false);
        let mirrored = PartitionLayout::new(true);

        assert_eq!(single.partitions.len(), 2);
        assert_eq!(mirrored.partitions.len(), 2);
        assert_eq!(single.boot(), mirrored.boot());
        assert_eq!(single.boot().sgdisk_new(), "1:2048:+512M");
        assert_eq!(single.boot().sgdisk_type(), "1:ef00");
    }

    #[test]
    fn payload_role_follows_redundancy() {
        assert_eq!(PartitionLayout::new(true).payload().role, PartitionRole::RaidMember);
        assert_eq!(PartitionLayout::new(false).payload().role, PartitionRole::Data);
        assert_eq!(PartitionLayout::new(true).payload().sgdisk_new(), "2:0:0");
    }

    #[test]
    fn partition_names_follow_kernel_conventions() {
        assert_eq!(
            partition_path(Path::new("/dev/sda"), 2),
            PathBuf::from("/dev/sda2")
        );
        assert_eq!(
            partition_path(Path::new("/dev/nvme0n1"), 1),
            PathBuf::from("/dev/nvme0n1p1")
        );
        assert_eq!(
            partition_path(Path::new("/dev/loop7"), 2),
            PathBuf::from("/dev/loop7p2")
        );
    }
}
