// SPDX-License-Identifier: GPL-3.0-only

//! Device-mapper registry, read from sysfs

use std::fs;
use std::path::Path;

use crate::error::Result;

pub const SYS_BLOCK_PATH: &str = "/sys/block";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmMapping {
    /// Mapping name as shown under `/dev/mapper`.
    pub name: String,
    /// Kernel node, e.g. `dm-0`.
    pub node: String,
    /// Kernel names of the devices underneath, e.g. `md0` or `sda2`.
    pub slaves: Vec<String>,
}

/// Walk `<sys_block>/dm-*` and collect every active mapping.
pub fn read_mappings(sys_block: &Path) -> Result<Vec<DmMapping>> {
    let mut mappings = Vec::new();

    let entries = match fs::read_dir(sys_block) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(mappings),
        Err(error) => return Err(error.into()),
    };

    for entry in entries.flatten() {
        let node = entry.file_name().to_string_lossy().into_owned();
        if !node.starts_with("dm-") {
            continue;
        }

        let Ok(name) = fs::read_to_string(entry.path().join("dm").join("name")) else {
            continue;
        };

        let mut slaves: Vec<String> = fs::read_dir(entry.path().join("slaves"))
            .map(|dir| {
                dir.flatten()
                    .map(|slave| slave.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        slaves.sort();

        mappings.push(DmMapping {
            name: name.trim().to_string(),
            node,
            slaves,
        });
    }

    mappings.sort_by(|a, b| a.node.cmp(&b.node));
    Ok(mappings)
}
