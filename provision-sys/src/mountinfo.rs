// SPDX-License-Identifier: GPL-3.0-only

//! `/proc/self/mountinfo` parsing

use std::path::{Path, PathBuf};

use crate::error::{Result, SysError};

pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
}

impl MountEntry {
    pub fn new(
        source: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        fs_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            mount_point: mount_point.into(),
            fs_type: fs_type.into(),
        }
    }
}

/// Parse mountinfo, keeping kernel order (parents before children).
pub fn parse_mountinfo(input: &str) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let invalid = || SysError::Parse {
            source_name: MOUNTINFO_PATH.to_string(),
            line: line.to_string(),
        };

        let (left, right) = line.split_once(" - ").ok_or_else(invalid)?;

        let mount_point = left.split_whitespace().nth(4).ok_or_else(invalid)?;

        let mut right_fields = right.split_whitespace();
        let fs_type = right_fields.next().ok_or_else(invalid)?;
        let source = right_fields.next().unwrap_or("none");

        entries.push(MountEntry {
            source: unescape_mount_field(source),
            mount_point: PathBuf::from(unescape_mount_field(mount_point)),
            fs_type: fs_type.to_string(),
        });
    }

    Ok(entries)
}

/// Mounts at or below `root`, in mount order.
pub fn mounts_under<'a>(entries: &'a [MountEntry], root: &Path) -> Vec<&'a MountEntry> {
    entries
        .iter()
        .filter(|entry| entry.mount_point.starts_with(root))
        .collect()
}

pub(crate) fn unescape_mount_field(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1..index + 4].iter().all(u8::is_ascii_digit)
        {
            let octal = &value[index + 1..index + 4];
            if let Ok(num) = u8::from_str_radix(octal, 8) {
                output.push(num as char);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index] as char);
        index += 1;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
36 25 8:2 / / rw,relatime - ext4 /dev/nvme0n1p2 rw
37 25 0:5 / /proc rw,nosuid,nodev,noexec,relatime - proc proc rw
90 25 0:48 /@ /mnt rw,noatime - btrfs /dev/mapper/cryptroot rw,compress=zstd:3
91 90 0:48 /@home /mnt/home rw,noatime - btrfs /dev/mapper/cryptroot rw
92 90 8:1 / /mnt/boot/efi rw,relatime - vfat /dev/sda1 rw
93 25 0:60 / /mnt2/with\\040space rw - tmpfs tmpfs rw
";

    #[test]
    fn keeps_kernel_order() {
        let entries = parse_mountinfo(SAMPLE).expect("parse should succeed");
        let points: Vec<_> = entries.iter().map(|e| e.mount_point.clone()).collect();
        assert_eq!(points[2], PathBuf::from("/mnt"));
        assert_eq!(points[4], PathBuf::from("/mnt/boot/efi"));
        assert_eq!(entries[4].source, "/dev/sda1");
        assert_eq!(entries[4].fs_type, "vfat");
    }

    #[test]
    fn unescapes_octal_sequences() {
        let entries = parse_mountinfo(SAMPLE).expect("parse should succeed");
        assert_eq!(entries[5].mount_point, PathBuf::from("/mnt2/with space"));
    }

    #[test]
    fn filters_by_root_prefix_not_string_prefix() {
        let entries = parse_mountinfo(SAMPLE).expect("parse should succeed");
        let under = mounts_under(&entries, Path::new("/mnt"));
        assert_eq!(under.len(), 3);
        assert!(under.iter().all(|e| e.fs_type != "tmpfs"));
    }

    #[test]
    fn rejects_lines_without_separator() {
        assert!(parse_mountinfo("36 25 8:2 / / rw\n").is_err());
    }
}
