// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use crate::command::{CommandOutcome, CommandRunner, CommandSpec};
use crate::devmapper::{self, DmMapping, SYS_BLOCK_PATH};
use crate::error::{Result, SysError};
use crate::mdstat::{MDSTAT_PATH, MdArray, parse_proc_mdstat};
use crate::mountinfo::{MOUNTINFO_PATH, MountEntry, parse_mountinfo};
use crate::probe::{Host, HostProbe};
use crate::process_finder;
use crate::swaps::{SWAPS_PATH, parse_proc_swaps};

const SYS_CLASS_BLOCK: &str = "/sys/class/block";
const SECTOR_BYTES: u64 = 512;

/// The live system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxHost;

impl LinuxHost {
    pub fn new() -> Self {
        Self
    }
}

/// Kernel name of a device node, following `/dev/disk/by-*` links.
fn kernel_name(device: &Path) -> String {
    let resolved = fs::canonicalize(device).unwrap_or_else(|_| device.to_path_buf());
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_optional(path: &str) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(error) => Err(error.into()),
    }
}

impl CommandRunner for LinuxHost {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        let rendered = spec.render();
        tracing::debug!(command = %rendered, "running");

        let mut expression = duct::cmd(&spec.program, &spec.args)
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        expression = match &spec.stdin {
            Some(input) => expression.stdin_bytes(input.clone()),
            None => expression.stdin_null(),
        };

        let output = expression.run().map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                SysError::ToolMissing(spec.program.clone())
            } else {
                SysError::Spawn {
                    command: rendered.clone(),
                    reason: error.to_string(),
                }
            }
        })?;

        let outcome = CommandOutcome {
            command: rendered,
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !outcome.success() {
            tracing::debug!(
                command = %outcome.command,
                status = ?outcome.status,
                stderr = %outcome.stderr.trim(),
                "command failed"
            );
        }

        Ok(outcome)
    }
}

impl HostProbe for LinuxHost {
    fn mounts(&self) -> Result<Vec<MountEntry>> {
        parse_mountinfo(&fs::read_to_string(MOUNTINFO_PATH)?)
    }

    fn md_arrays(&self) -> Result<Vec<MdArray>> {
        // Absent until the md driver is loaded.
        Ok(parse_proc_mdstat(&read_optional(MDSTAT_PATH)?))
    }

    fn mappings(&self) -> Result<Vec<DmMapping>> {
        devmapper::read_mappings(Path::new(SYS_BLOCK_PATH))
    }

    fn swaps(&self) -> Result<Vec<PathBuf>> {
        Ok(parse_proc_swaps(&read_optional(SWAPS_PATH)?))
    }

    fn partitions_of(&self, device: &Path) -> Result<Vec<PathBuf>> {
        let name = kernel_name(device);
        let sys_dir = Path::new(SYS_CLASS_BLOCK).join(&name);

        let entries = match fs::read_dir(&sys_dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut partitions: Vec<(u32, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let child = entry.file_name().to_string_lossy().into_owned();
                if !child.starts_with(&name) {
                    return None;
                }
                let number = fs::read_to_string(entry.path().join("partition")).ok()?;
                let number = number.trim().parse().ok()?;
                Some((number, PathBuf::from("/dev").join(child)))
            })
            .collect();

        partitions.sort();
        Ok(partitions.into_iter().map(|(_, node)| node).collect())
    }

    fn signatures(&self, node: &Path) -> Result<Vec<String>> {
        if !node.exists() {
            return Ok(Vec::new());
        }

        let outcome = self.run_checked(
            &CommandSpec::new("wipefs")
                .args(["--noheadings", "--output", "TYPE"])
                .path_arg(node),
        )?;

        Ok(outcome
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    fn uuid_of(&self, node: &Path) -> Result<Option<String>> {
        let outcome = self.run(
            &CommandSpec::new("blkid")
                .args(["-s", "UUID", "-o", "value"])
                .path_arg(node),
        )?;

        // blkid exits 2 when the requested tag is absent.
        if outcome.status == Some(2) {
            return Ok(None);
        }
        let outcome = outcome.into_checked()?;
        let uuid = outcome.stdout.trim();
        Ok((!uuid.is_empty()).then(|| uuid.to_string()))
    }

    fn size_bytes(&self, device: &Path) -> Result<u64> {
        let path = Path::new(SYS_CLASS_BLOCK)
            .join(kernel_name(device))
            .join("size");
        let raw = fs::read_to_string(&path)?;
        let sectors: u64 = raw.trim().parse().map_err(|_| SysError::Parse {
            source_name: path.display().to_string(),
            line: raw.trim().to_string(),
        })?;
        Ok(sectors * SECTOR_BYTES)
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_block_device(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok_and(|metadata| metadata.file_type().is_block_device())
    }

    fn tool_available(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }

    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }
}

impl Host for LinuxHost {
    fn release_holders(&self, root: &Path) -> usize {
        let holders = process_finder::find_processes_using(root);
        if holders.is_empty() {
            return 0;
        }

        for holder in &holders {
            tracing::warn!(pid = holder.pid, command = %holder.command, "terminating process holding {}", root.display());
        }

        let pids: Vec<i32> = holders.iter().map(|holder| holder.pid).collect();
        process_finder::kill_processes(&pids)
            .iter()
            .filter(|result| result.success)
            .count()
    }
}
