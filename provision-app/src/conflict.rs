// SPDX-License-Identifier: GPL-3.0-only

//! Detects storage state left on the targets by an earlier run or another system

use std::fmt;
use std::path::PathBuf;

use provision_sys::Host;
use provision_types::partition_path;

use crate::config::InstallConfig;
use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictSignal {
    /// A RAID array is assembled from a target partition or uses the configured node.
    ActiveArray { array: String },
    /// The configured encrypted mapping is open.
    OpenMapping { name: String },
    /// A target device already has partition nodes.
    ExistingPartitions { device: PathBuf, count: usize },
}

impl fmt::Display for ConflictSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveArray { array } => write!(f, "array {array} is active"),
            Self::OpenMapping { name } => write!(f, "mapping {name} is open"),
            Self::ExistingPartitions { device, count } => {
                write!(f, "{} has {count} partition(s)", device.display())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub signals: Vec<ConflictSignal>,
}

impl ConflictReport {
    pub fn has_conflict(&self) -> bool {
        !self.signals.is_empty()
    }

    pub fn summary(&self) -> String {
        self.signals
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// `Err(Conflict)` unless the report is clean.
    pub fn into_result(self) -> Result<()> {
        if self.has_conflict() {
            Err(ProvisionError::Conflict(self.summary()))
        } else {
            Ok(())
        }
    }
}

/// Probe the three independent conflict signals. Reads only.
pub fn scan(config: &InstallConfig, devices: &[PathBuf], host: &dyn Host) -> Result<ConflictReport> {
    let probe_error =
        |error: provision_sys::SysError| ProvisionError::Configuration(format!("probe failed: {error}"));

    let mut report = ConflictReport::default();

    let candidate_members: Vec<PathBuf> = devices
        .iter()
        .flat_map(|device| {
            let mut nodes = host.partitions_of(device).unwrap_or_default();
            nodes.push(partition_path(device, 2));
            nodes.push(device.clone());
            nodes
        })
        .collect();

    for array in host.md_arrays().map_err(probe_error)? {
        let touches_target = candidate_members
            .iter()
            .any(|node| array.has_member(node));
        if touches_target || array.device() == config.array_device {
            report.signals.push(ConflictSignal::ActiveArray {
                array: array.name.clone(),
            });
        }
    }

    if host
        .mapping_active(&config.mapping_name)
        .map_err(probe_error)?
    {
        report.signals.push(ConflictSignal::OpenMapping {
            name: config.mapping_name.clone(),
        });
    }

    for device in devices {
        let partitions = host.partitions_of(device).map_err(probe_error)?;
        if !partitions.is_empty() {
            report.signals.push(ConflictSignal::ExistingPartitions {
                device: device.clone(),
                count: partitions.len(),
            });
        }
    }

    for signal in &report.signals {
        tracing::warn!("conflict: {signal}");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision_testing::FakeHost;

    fn config() -> InstallConfig {
        InstallConfig::with_devices(vec![PathBuf::from("/dev/vda"), PathBuf::from("/dev/vdb")])
    }

    #[test]
    fn blank_disks_have_no_conflict() {
        let host = FakeHost::new().with_disk("/dev/vda").with_disk("/dev/vdb");
        let config = config();
        let report = scan(&config, &config.devices, &host).unwrap();
        assert!(!report.has_conflict());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn each_signal_is_detected_independently() {
        let config = config();

        let host = FakeHost::new()
            .with_disk("/dev/vda")
            .with_disk("/dev/vdb")
            .with_partitions("/dev/vda", 2);
        let report = scan(&config, &config.devices, &host).unwrap();
        assert_eq!(report.signals.len(), 1);
        assert!(matches!(report.signals[0], ConflictSignal::ExistingPartitions { count: 2, .. }));

        let host = FakeHost::new()
            .with_disk("/dev/vda")
            .with_disk("/dev/vdb")
            .with_active_array("md127", &["/dev/vdb2"]);
        let report = scan(&config, &config.devices, &host).unwrap();
        assert_eq!(
            report.signals,
            vec![ConflictSignal::ActiveArray { array: "md127".to_string() }]
        );

        let host = FakeHost::new()
            .with_disk("/dev/vda")
            .with_disk("/dev/vdb")
            .with_open_mapping("cryptroot", "/dev/vda");
        let report = scan(&config, &config.devices, &host).unwrap();
        assert_eq!(
            report.signals,
            vec![ConflictSignal::OpenMapping { name: "cryptroot".to_string() }]
        );
    }

    #[test]
    fn conflict_error_names_every_signal() {
        let report = ConflictReport {
            signals: vec![
                ConflictSignal::ActiveArray { array: "md0".into() },
                ConflictSignal::OpenMapping { name: "cryptroot".into() },
            ],
        };
        let error = report.into_result().unwrap_err();
        assert!(matches!(error, ProvisionError::Conflict(_)));
        assert!(error.to_string().contains("md0 is active; mapping cryptroot is open"));
    }
}
