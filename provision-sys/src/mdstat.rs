// SPDX-License-Identifier: GPL-3.0-only

//! Software RAID registry parsing (`/proc/mdstat`, `mdadm --detail --scan`)

use std::path::{Path, PathBuf};

pub const MDSTAT_PATH: &str = "/proc/mdstat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdArray {
    /// Kernel name, e.g. `md0`.
    pub name: String,
    pub level: Option<String>,
    /// Member kernel names, e.g. `sda2`.
    pub members: Vec<String>,
    pub degraded: bool,
}

impl MdArray {
    pub fn device(&self) -> PathBuf {
        PathBuf::from("/dev").join(&self.name)
    }

    /// True when `node` (a `/dev/...` path) is one of the members.
    pub fn has_member(&self, node: &Path) -> bool {
        node.file_name()
            .map(|name| name.to_string_lossy())
            .is_some_and(|name| self.members.iter().any(|member| *member == name))
    }
}

/// One `ARRAY` line from `mdadm --detail --scan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDescriptor {
    pub device: String,
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub line: String,
}

pub fn parse_detail_scan(output: &str) -> Vec<ArrayDescriptor> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if !line.starts_with("ARRAY ") {
                return None;
            }

            let mut parts = line.split_whitespace();
            let _array = parts.next()?;
            let device = parts.next()?.to_string();

            let mut name = None;
            let mut uuid = None;

            for token in parts {
                if let Some(value) = token.strip_prefix("name=") {
                    name = Some(value.to_string());
                }
                if let Some(value) = token.strip_prefix("UUID=") {
                    uuid = Some(value.to_string());
                }
            }

            Some(ArrayDescriptor {
                device,
                name,
                uuid,
                line: line.to_string(),
            })
        })
        .collect()
}

pub fn parse_proc_mdstat(output: &str) -> Vec<MdArray> {
    let mut arrays: Vec<MdArray> = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Personalities") || line.starts_with("unused") {
            continue;
        }

        if line.starts_with("md") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 && parts[1] == ":" {
                let level = parts
                    .iter()
                    .find(|part| part.starts_with("raid"))
                    .map(|part| (*part).to_string());
                let members = parts
                    .iter()
                    .filter(|part| part.contains('[') && part.contains(']'))
                    .filter_map(|part| part.split('[').next())
                    .map(ToString::to_string)
                    .collect();

                arrays.push(MdArray {
                    name: parts[0].to_string(),
                    level,
                    members,
                    degraded: false,
                });
            }
            continue;
        }

        // `976630464 blocks super 1.2 [2/2] [UU]`
        if let Some(array) = arrays.last_mut()
            && line.contains(" blocks ")
            && let Some(status) = line.split_whitespace().last()
            && status.starts_with('[')
        {
            array.degraded = status.contains('_');
        }
    }

    arrays
}

#[cfg(test)]
mod tests {
    use super::*;

    const MDSTAT: &str = "\
Personalities : [raid1] [linear] [multipath] [raid0]
md0 : active raid1 sdb2[1] sda2[0]
      976630464 blocks super 1.2 [2/2] [UU]
      [>....................]  resync =  0.4% (4193280/976630464) finish=77.2min

md127 : inactive sdc1[0](S)
      1048576 blocks super 1.2

unused devices: <none>
";

    #[test]
    fn parses_active_and_inactive_arrays() {
        let arrays = parse_proc_mdstat(MDSTAT);
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0].name, "md0");
        assert_eq!(arrays[0].level.as_deref(), Some("raid1"));
        assert_eq!(arrays[0].members, vec!["sdb2", "sda2"]);
        assert!(!arrays[0].degraded);
        assert_eq!(arrays[1].members, vec!["sdc1"]);
        assert_eq!(arrays[1].level, None);
    }

    #[test]
    fn detects_degraded_mirror() {
        let arrays = parse_proc_mdstat(
            "md0 : active raid1 sda2[0]\n      1000 blocks super 1.2 [2/1] [U_]\n",
        );
        assert!(arrays[0].degraded);
    }

    #[test]
    fn membership_matches_kernel_names() {
        let arrays = parse_proc_mdstat(MDSTAT);
        assert!(arrays[0].has_member(Path::new("/dev/sda2")));
        assert!(!arrays[0].has_member(Path::new("/dev/sda1")));
        assert_eq!(arrays[0].device(), PathBuf::from("/dev/md0"));
    }

    #[test]
    fn parses_detail_scan_lines() {
        let scan = parse_detail_scan(
            "ARRAY /dev/md0 metadata=1.2 name=live:0 UUID=3b7c1a2e:11f0a9c4:8e1d2f3a:4b5c6d7e\n",
        );
        assert_eq!(scan.len(), 1);
        assert_eq!(scan[0].device, "/dev/md0");
        assert_eq!(scan[0].name.as_deref(), Some("live:0"));
        assert_eq!(
            scan[0].uuid.as_deref(),
            Some("3b7c1a2e:11f0a9c4:8e1d2f3a:4b5c6d7e")
        );
        assert!(scan[0].line.starts_with("ARRAY /dev/md0"));
    }
}
