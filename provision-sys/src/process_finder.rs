// SPDX-License-Identifier: GPL-3.0-only

//! Finds and kills processes that keep the target tree busy

use std::path::Path;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// A process holding a path below the target root open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub command: String,
}

/// Result of attempting to kill a single process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillResult {
    pub pid: i32,
    pub success: bool,
    pub error: Option<String>,
}

/// Processes with an open descriptor, cwd or root below `mount_point`.
///
/// Processes that vanish or cannot be inspected are skipped.
pub fn find_processes_using(mount_point: &Path) -> Vec<ProcessInfo> {
    if !mount_point.is_absolute() {
        tracing::warn!(mount_point = %mount_point.display(), "not an absolute path, skipping holder scan");
        return Vec::new();
    }

    let all_procs = match procfs::process::all_processes() {
        Ok(procs) => procs,
        Err(e) => {
            tracing::warn!("Failed to enumerate processes: {}", e);
            return Vec::new();
        }
    };

    let own_pid = std::process::id() as i32;
    let mut result = Vec::new();

    for proc_result in all_procs {
        let Ok(process) = proc_result else {
            continue;
        };
        if process.pid() == own_pid {
            continue;
        }

        if !holds_path(&process, mount_point) {
            continue;
        }

        let command = process
            .stat()
            .map(|stat| stat.comm)
            .unwrap_or_else(|_| format!("<PID {}>", process.pid()));

        tracing::debug!(pid = process.pid(), %command, "process holds target tree");
        result.push(ProcessInfo {
            pid: process.pid(),
            command,
        });
    }

    result
}

fn holds_path(process: &procfs::process::Process, mount_point: &Path) -> bool {
    if process
        .cwd()
        .is_ok_and(|cwd| cwd.starts_with(mount_point))
        || process
            .root()
            .is_ok_and(|root| root.starts_with(mount_point))
    {
        return true;
    }

    let Ok(fds) = process.fd() else {
        return false;
    };

    fds.flatten().any(|fd| match &fd.target {
        procfs::process::FDTarget::Path(path) => path.starts_with(mount_point),
        _ => false,
    })
}

/// Send SIGKILL to each pid. PID 1 and below are never signalled.
pub fn kill_processes(pids: &[i32]) -> Vec<KillResult> {
    let mut results = Vec::new();

    for &pid in pids {
        if pid <= 1 {
            tracing::warn!("Refusing to kill system process with PID {}", pid);
            results.push(KillResult {
                pid,
                success: false,
                error: Some("Refusing to kill system process".to_string()),
            });
            continue;
        }

        match kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) | Err(nix::Error::ESRCH) => {
                tracing::info!(pid, "killed process holding target tree");
                results.push(KillResult {
                    pid,
                    success: true,
                    error: None,
                });
            }
            Err(e) => {
                tracing::warn!("Failed to kill process {}: {}", pid, e);
                results.push(KillResult {
                    pid,
                    success: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_init_and_kernel() {
        let results = kill_processes(&[0, 1, -1]);
        assert!(results.iter().all(|result| !result.success));
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn relative_path_finds_nothing() {
        assert!(find_processes_using(Path::new("relative/mnt")).is_empty());
    }
}
