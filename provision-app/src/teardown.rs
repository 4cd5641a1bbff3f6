// SPDX-License-Identifier: GPL-3.0-only

//! Teardown engine
//!
//! Removes every layer this tool builds, top down: swap, mounts, the
//! encrypted mapping, the array, then on-disk metadata. Each step probes the
//! live state first and only acts on what it finds, so the engine can be run
//! against a complete stack, a half-built one or clean disks, any number of
//! times. A failing step is recorded and the engine moves on.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use provision_sys::mountinfo::mounts_under;
use provision_sys::{CommandSpec, Host, MdArray};
use provision_types::MIB;

use crate::config::InstallConfig;

/// Upper bound on unmount attempts, so a mount that reappears cannot loop forever.
const MAX_UNMOUNTS: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Commands that succeeded, rendered.
    pub actions: Vec<String>,
    /// Steps that failed; none of them stopped the engine.
    pub failures: Vec<String>,
    pub remaining_mounts: Vec<PathBuf>,
    pub remaining_arrays: Vec<String>,
    pub remaining_mappings: Vec<String>,
    pub remaining_signatures: Vec<(PathBuf, Vec<String>)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.remaining_mounts.is_empty()
            && self.remaining_arrays.is_empty()
            && self.remaining_mappings.is_empty()
            && self.remaining_signatures.is_empty()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            actions = self.actions.len(),
            failures = self.failures.len(),
            "teardown finished"
        );
        for failure in &self.failures {
            tracing::warn!("teardown step failed: {failure}");
        }

        let list = |items: Vec<String>| {
            if items.is_empty() {
                "none".to_string()
            } else {
                items.join(", ")
            }
        };
        tracing::info!(
            "remaining mounts: {}",
            list(self.remaining_mounts.iter().map(|p| p.display().to_string()).collect())
        );
        tracing::info!("remaining arrays: {}", list(self.remaining_arrays.clone()));
        tracing::info!("remaining mappings: {}", list(self.remaining_mappings.clone()));
        if self.remaining_signatures.is_empty() {
            tracing::info!("remaining signatures: none");
        }
        for (node, signatures) in &self.remaining_signatures {
            tracing::warn!("remaining signatures on {}: {}", node.display(), signatures.join(", "));
        }
    }
}

struct Engine<'a> {
    config: &'a InstallConfig,
    devices: &'a [PathBuf],
    host: &'a dyn Host,
    report: TeardownReport,
}

/// Tear down everything on `devices` and below the configured target root.
pub fn teardown(config: &InstallConfig, devices: &[PathBuf], host: &dyn Host) -> TeardownReport {
    tracing::info!(devices = devices.len(), "tearing down storage stack");

    let mut engine = Engine {
        config,
        devices,
        host,
        report: TeardownReport::default(),
    };

    engine.release_swaps();
    engine.release_holders();
    engine.unmount_tree();
    engine.close_mappings();
    engine.stop_arrays();
    for device in devices {
        engine.wipe_device(device);
    }
    engine.verify();

    engine.report
}

/// Release the finished install without destroying it: swap off, unmount in
/// reverse order, close the mapping. The array is left assembled.
pub fn safe_unmount(config: &InstallConfig, host: &dyn Host) -> TeardownReport {
    let mut engine = Engine {
        config,
        devices: &[],
        host,
        report: TeardownReport::default(),
    };

    engine.release_swaps();
    engine.unmount_tree();
    if host.mapping_active(&config.mapping_name).unwrap_or(false) {
        engine.attempt(
            CommandSpec::new("cryptsetup")
                .arg("close")
                .arg(&config.mapping_name),
        );
    }

    engine.report
}

impl Engine<'_> {
    fn attempt(&mut self, spec: CommandSpec) -> bool {
        match self.host.run(&spec) {
            Ok(outcome) if outcome.success() => {
                tracing::info!(command = %spec, "teardown step done");
                self.report.actions.push(spec.render());
                true
            }
            Ok(outcome) => {
                let detail = format!("{spec}: {}", outcome.stderr.trim());
                tracing::warn!("{detail}");
                self.report.failures.push(detail);
                false
            }
            Err(error) => {
                let detail = format!("{spec}: {error}");
                tracing::warn!("{detail}");
                self.report.failures.push(detail);
                false
            }
        }
    }

    fn note_probe_failure(&mut self, what: &str, error: provision_sys::SysError) {
        let detail = format!("probe {what}: {error}");
        tracing::warn!("{detail}");
        self.report.failures.push(detail);
    }

    fn root(&self) -> &Path {
        &self.config.target_root
    }

    /// Kernel names of every node that may sit under our mapping or array.
    fn target_nodes(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for device in self.devices {
            if let Some(name) = device.file_name() {
                names.insert(name.to_string_lossy().into_owned());
            }
            for partition in self.host.partitions_of(device).unwrap_or_default() {
                if let Some(name) = partition.file_name() {
                    names.insert(name.to_string_lossy().into_owned());
                }
            }
        }
        names
    }

    fn is_target_array(&self, array: &MdArray, nodes: &BTreeSet<String>) -> bool {
        array.device() == self.config.array_device
            || array.members.iter().any(|member| nodes.contains(member))
    }

    fn release_swaps(&mut self) {
        let swaps = match self.host.swaps() {
            Ok(swaps) => swaps,
            Err(error) => return self.note_probe_failure("swaps", error),
        };
        let ours: Vec<PathBuf> = swaps
            .into_iter()
            .filter(|swap| swap.starts_with(self.root()))
            .collect();
        for swap in ours {
            self.attempt(CommandSpec::new("swapoff").path_arg(&swap));
        }
    }

    fn release_holders(&mut self) {
        let mounted = self
            .host
            .mounts()
            .map(|mounts| !mounts_under(&mounts, self.root()).is_empty())
            .unwrap_or(false);
        if mounted {
            let killed = self.host.release_holders(self.root());
            if killed > 0 {
                tracing::warn!(killed, "terminated processes holding the target root");
            }
        }
    }

    fn unmount_tree(&mut self) {
        for _ in 0..MAX_UNMOUNTS {
            let mounts = match self.host.mounts() {
                Ok(mounts) => mounts,
                Err(error) => return self.note_probe_failure("mounts", error),
            };
            let Some(innermost) = mounts_under(&mounts, self.root())
                .last()
                .map(|entry| entry.mount_point.clone())
            else {
                return;
            };

            if self.attempt(CommandSpec::new("umount").path_arg(&innermost)) {
                continue;
            }
            if !self.attempt(CommandSpec::new("umount").arg("-l").path_arg(&innermost)) {
                return;
            }
        }
    }

    fn close_mappings(&mut self) {
        let mappings = match self.host.mappings() {
            Ok(mappings) => mappings,
            Err(error) => return self.note_probe_failure("mappings", error),
        };
        let mut nodes = self.target_nodes();
        if let Some(array) = self.config.array_device.file_name() {
            nodes.insert(array.to_string_lossy().into_owned());
        }

        for mapping in mappings {
            let ours = mapping.name == self.config.mapping_name
                || mapping.slaves.iter().any(|slave| nodes.contains(slave));
            if !ours {
                continue;
            }
            if !self.attempt(CommandSpec::new("cryptsetup").arg("close").arg(&mapping.name)) {
                self.attempt(
                    CommandSpec::new("dmsetup")
                        .args(["remove", "--force"])
                        .arg(&mapping.name),
                );
            }
        }
    }

    fn stop_arrays(&mut self) {
        let arrays = match self.host.md_arrays() {
            Ok(arrays) => arrays,
            Err(error) => return self.note_probe_failure("arrays", error),
        };
        let nodes = self.target_nodes();

        let ours: Vec<MdArray> = arrays
            .into_iter()
            .filter(|array| self.is_target_array(array, &nodes))
            .collect();

        for array in ours {
            let device = array.device();
            let touches_targets = array.members.iter().any(|member| nodes.contains(member));
            if touches_targets && !self.host.signatures(&device).unwrap_or_default().is_empty() {
                // Clears the LUKS header while it is still addressable.
                self.attempt(CommandSpec::new("wipefs").arg("-a").path_arg(&device));
            }
            self.attempt(CommandSpec::new("mdadm").arg("--stop").path_arg(&device));
        }
    }

    fn wipe_device(&mut self, device: &Path) {
        let partitions = self.host.partitions_of(device).unwrap_or_default();

        for partition in &partitions {
            let signatures = self.host.signatures(partition).unwrap_or_default();
            if signatures.iter().any(|kind| kind == "linux_raid_member") {
                self.attempt(
                    CommandSpec::new("mdadm")
                        .arg("--zero-superblock")
                        .path_arg(partition),
                );
            }
            if !self.host.signatures(partition).unwrap_or_default().is_empty() {
                self.attempt(CommandSpec::new("wipefs").arg("-a").path_arg(partition));
            }
        }

        let signatures = self.host.signatures(device).unwrap_or_default();
        if partitions.is_empty() && signatures.is_empty() {
            tracing::debug!(device = %device.display(), "device already blank");
            return;
        }

        if !signatures.is_empty() {
            self.attempt(CommandSpec::new("wipefs").arg("-a").path_arg(device));
        }
        self.attempt(CommandSpec::new("sgdisk").arg("--zap-all").path_arg(device));
        self.wipe_boundaries(device);
        self.attempt(CommandSpec::new("partprobe").path_arg(device));
    }

    /// Zero the first and last MiB, where partition tables and stray
    /// superblocks live.
    fn wipe_boundaries(&mut self, device: &Path) {
        let target = format!("of={}", device.display());
        let zero = |extra: Option<String>| {
            let spec = CommandSpec::new("dd")
                .args(["if=/dev/zero", target.as_str(), "bs=1M", "count=1", "conv=fsync"]);
            match extra {
                Some(seek) => spec.arg(seek),
                None => spec,
            }
        };

        self.attempt(zero(None));

        match self.host.size_bytes(device) {
            Ok(size) if size >= 2 * MIB => {
                self.attempt(zero(Some(format!("seek={}", size / MIB - 1))));
            }
            Ok(_) => {}
            Err(error) => self.note_probe_failure("device size", error),
        }
    }

    fn verify(&mut self) {
        let nodes = self.target_nodes();

        self.report.remaining_mounts = self
            .host
            .mounts()
            .map(|mounts| {
                mounts_under(&mounts, self.root())
                    .into_iter()
                    .map(|entry| entry.mount_point.clone())
                    .collect()
            })
            .unwrap_or_default();

        self.report.remaining_arrays = self
            .host
            .md_arrays()
            .unwrap_or_default()
            .iter()
            .filter(|array| self.is_target_array(array, &nodes))
            .map(|array| array.name.clone())
            .collect();

        self.report.remaining_mappings = self
            .host
            .mappings()
            .unwrap_or_default()
            .into_iter()
            .filter(|mapping| {
                mapping.name == self.config.mapping_name
                    || mapping.slaves.iter().any(|slave| nodes.contains(slave))
            })
            .map(|mapping| mapping.name)
            .collect();

        let mut remaining = Vec::new();
        for device in self.devices {
            let mut nodes = vec![device.clone()];
            nodes.extend(self.host.partitions_of(device).unwrap_or_default());
            for node in nodes {
                let signatures = self.host.signatures(&node).unwrap_or_default();
                if !signatures.is_empty() {
                    remaining.push((node, signatures));
                }
            }
        }
        self.report.remaining_signatures = remaining;
    }
}
