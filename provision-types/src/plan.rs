// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::arch::Architecture;
use crate::layout::{PartitionLayout, partition_path};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no target devices were given")]
    NoDevices,

    #[error("device listed more than once: {0}")]
    DuplicateDevice(PathBuf),

    #[error("not a block device: {0}")]
    NotBlockDevice(PathBuf),
}

/// Everything the stages need to know about the run, decided once at startup.
///
/// Fields are private so the only way to obtain a plan is [`ProvisioningPlan::new`],
/// which keeps `redundancy_enabled` tied to the device count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningPlan {
    devices: Vec<PathBuf>,
    redundancy_enabled: bool,
    architecture: Architecture,
    bootloader_target: String,
    swap_size_gib: u64,
}

impl ProvisioningPlan {
    pub fn new(
        devices: Vec<PathBuf>,
        architecture: Architecture,
        swap_size_gib: u64,
    ) -> Result<Self, PlanError> {
        if devices.is_empty() {
            return Err(PlanError::NoDevices);
        }

        let mut seen = BTreeSet::new();
        for device in &devices {
            if !seen.insert(device.clone()) {
                return Err(PlanError::DuplicateDevice(device.clone()));
            }
        }

        Ok(Self {
            redundancy_enabled: devices.len() > 1,
            bootloader_target: architecture.grub_target().to_string(),
            devices,
            architecture,
            swap_size_gib,
        })
    }

    pub fn devices(&self) -> &[PathBuf] {
        &self.devices
    }

    /// The device whose boot partition stays mounted in the target.
    pub fn primary_device(&self) -> &Path {
        &self.devices[0]
    }

    pub fn redundancy_enabled(&self) -> bool {
        self.redundancy_enabled
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn bootloader_target(&self) -> &str {
        &self.bootloader_target
    }

    pub fn swap_size_gib(&self) -> u64 {
        self.swap_size_gib
    }

    pub fn swap_enabled(&self) -> bool {
        self.swap_size_gib > 0
    }

    pub fn layout(&self) -> PartitionLayout {
        PartitionLayout::new(self.redundancy_enabled)
    }

    pub fn boot_partition(&self, device: &Path) -> PathBuf {
        partition_path(device, 1)
    }

    pub fn payload_partition(&self, device: &Path) -> PathBuf {
        partition_path(device, 2)
    }

    pub fn boot_partitions(&self) -> Vec<PathBuf> {
        self.devices
            .iter()
            .map(|device| self.boot_partition(device))
            .collect()
    }

    pub fn payload_partitions(&self) -> Vec<PathBuf> {
        self.devices
            .iter()
            .map(|device| self.payload_partition(device))
            .collect()
    }

    /// Block device that receives the LUKS container.
    pub fn encryption_target(&self, array_device: &Path) -> PathBuf {
        if self.redundancy_enabled {
            array_device.to_path_buf()
        } else {
            self.payload_partition(self.primary_device())
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|index| PathBuf::from(format!("/dev/sd{}", (b'a' + index as u8) as char)))
            .collect()
    }

    #[test]
    fn redundancy_tracks_device_count() {
        for count in 1..=4 {
            let plan = ProvisioningPlan::new(devices(count), Architecture::Amd64, 0).unwrap();
            assert_eq!(plan.redundancy_enabled(), count > 1, "count {count}");
        }
    }

    #[test]
    fn empty_device_list_is_rejected() {
        assert_eq!(
            ProvisioningPlan::new(Vec::new(), Architecture::Amd64, 0),
            Err(PlanError::NoDevices)
        );
    }

    #[test]
    fn duplicate_device_is_rejected() {
        let list = vec![PathBuf::from("/dev/sda"), PathBuf::from("/dev/sda")];
        assert!(matches!(
            ProvisioningPlan::new(list, Architecture::Amd64, 0),
            Err(PlanError::DuplicateDevice(_))
        ));
    }

    #[test]
    fn encryption_target_depends_on_redundancy() {
        let md = Path::new("/dev/md0");
        let single = ProvisioningPlan::new(devices(1), Architecture::Amd64, 0).unwrap();
        let mirrored = ProvisioningPlan::new(devices(2), Architecture::Arm64, 16).unwrap();

        assert_eq!(single.encryption_target(md), PathBuf::from("/dev/sda2"));
        assert_eq!(mirrored.encryption_target(md), PathBuf::from("/dev/md0"));
        assert_eq!(mirrored.bootloader_target(), "arm64-efi");
        assert!(mirrored.swap_enabled());
    }
}
