// SPDX-License-Identifier: GPL-3.0-only

//! Device prober: derives the immutable plan from configuration and live state

use provision_sys::{CommandSpec, Host};
use provision_types::{Architecture, PlanError, ProvisioningPlan};

use crate::config::InstallConfig;
use crate::error::{ProvisionError, Result};

/// Tools every run needs on the live host.
pub const REQUIRED_TOOLS: &[&str] = &[
    "sgdisk",
    "partprobe",
    "udevadm",
    "wipefs",
    "blkid",
    "cryptsetup",
    "mkfs.vfat",
    "mkfs.btrfs",
    "btrfs",
    "mount",
    "umount",
    "mkswap",
    "swapon",
    "swapoff",
    "fallocate",
    "dd",
    "debootstrap",
    "chroot",
];

/// Only needed when the payload is mirrored.
pub const REDUNDANCY_TOOLS: &[&str] = &["mdadm"];

/// Ask dpkg first, then the kernel. Never fails: an unrecognised answer
/// falls back to amd64 with a warning.
pub fn detect_architecture(host: &dyn Host) -> Architecture {
    let probes = [
        CommandSpec::new("dpkg").arg("--print-architecture"),
        CommandSpec::new("uname").arg("-m"),
    ];

    for probe in &probes {
        match host.run(probe) {
            Ok(outcome) if outcome.success() => {
                if let Some(arch) = Architecture::from_alias(&outcome.stdout) {
                    tracing::debug!(probe = %probe, %arch, "architecture detected");
                    return arch;
                }
                tracing::debug!(probe = %probe, answer = %outcome.stdout.trim(), "unrecognised architecture");
            }
            Ok(outcome) => {
                tracing::debug!(probe = %probe, status = ?outcome.status, "architecture probe failed");
            }
            Err(error) => {
                tracing::debug!(probe = %probe, "architecture probe unavailable: {error}");
            }
        }
    }

    tracing::warn!(
        "could not determine the host architecture, assuming {}",
        Architecture::FALLBACK
    );
    Architecture::FALLBACK
}

pub fn probe(config: &InstallConfig, host: &dyn Host) -> Result<ProvisioningPlan> {
    let architecture = detect_architecture(host);
    let plan = ProvisioningPlan::new(config.devices.clone(), architecture, config.swap_size_gib)?;

    for device in plan.devices() {
        if !host.is_block_device(device) {
            return Err(PlanError::NotBlockDevice(device.clone()).into());
        }
    }

    let mut needed: Vec<&str> = REQUIRED_TOOLS.to_vec();
    if plan.redundancy_enabled() {
        needed.extend_from_slice(REDUNDANCY_TOOLS);
    }
    let missing: Vec<&str> = needed
        .into_iter()
        .filter(|tool| !host.tool_available(tool))
        .collect();
    if !missing.is_empty() {
        return Err(ProvisionError::Configuration(format!(
            "required tools not found: {}",
            missing.join(", ")
        )));
    }

    tracing::info!(
        devices = plan.devices().len(),
        redundancy = plan.redundancy_enabled(),
        %architecture,
        swap_gib = plan.swap_size_gib(),
        "provisioning plan derived"
    );

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use provision_testing::FakeHost;

    fn config(devices: &[&str]) -> InstallConfig {
        InstallConfig::with_devices(devices.iter().map(PathBuf::from).collect())
    }

    #[test]
    fn redundancy_follows_device_count() {
        let host = FakeHost::new().with_disk("/dev/vda").with_disk("/dev/vdb");
        assert!(!probe(&config(&["/dev/vda"]), &host).unwrap().redundancy_enabled());
        assert!(probe(&config(&["/dev/vda", "/dev/vdb"]), &host).unwrap().redundancy_enabled());
    }

    #[test]
    fn rejects_empty_duplicate_and_non_block_inputs() {
        let host = FakeHost::new().with_disk("/dev/vda");
        for devices in [&[][..], &["/dev/vda", "/dev/vda"][..], &["/dev/vdz"][..]] {
            assert!(matches!(
                probe(&config(devices), &host),
                Err(ProvisionError::Configuration(_))
            ));
        }
    }

    #[test]
    fn mdadm_only_required_for_mirrors() {
        let host = FakeHost::new()
            .with_disk("/dev/vda")
            .with_disk("/dev/vdb")
            .without_tool("mdadm");
        assert!(probe(&config(&["/dev/vda"]), &host).is_ok());
        let error = probe(&config(&["/dev/vda", "/dev/vdb"]), &host).unwrap_err();
        assert!(error.to_string().contains("mdadm"));
    }

    #[test]
    fn architecture_falls_back_to_uname_then_amd64() {
        let host = FakeHost::new().with_architecture(None, "aarch64");
        assert_eq!(detect_architecture(&host), Architecture::Arm64);

        let host = FakeHost::new().with_architecture(Some("s390x"), "s390x");
        assert_eq!(detect_architecture(&host), Architecture::Amd64);
    }
}
