// SPDX-License-Identifier: GPL-3.0-only

//! Scripts executed with the target root as `/`
//!
//! A [`ChrootSession`] binds the host's pseudo filesystems into the target,
//! lends it a resolver configuration when it has none, and undoes both on
//! close.

pub mod scripts;

pub use scripts::GeneratedScript;

use std::fs::{self, Permissions};
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};

use provision_sys::{CommandSpec, Host};
use provision_types::Stage;

use crate::config::InstallConfig;
use crate::error::{ProvisionError, Result, StageResultExt};

const STAGE: Stage = Stage::SecondaryContext;

/// Host paths bound into the target, parents first.
pub const BIND_MOUNTS: &[&str] = &["/dev", "/dev/pts", "/proc", "/sys", "/run"];

const RESOLV_CONF: &str = "etc/resolv.conf";

/// What was in the target's resolv.conf before we replaced it.
#[derive(Debug)]
enum ResolverLoan {
    Untouched,
    Placed,
    ReplacedLink(PathBuf),
}

pub struct ChrootSession<'a> {
    root: PathBuf,
    host: &'a dyn Host,
    bound: Vec<PathBuf>,
    resolver: ResolverLoan,
}

impl<'a> ChrootSession<'a> {
    pub fn open(config: &InstallConfig, host: &'a dyn Host) -> Result<Self> {
        let mut session = Self {
            root: config.target_root.clone(),
            host,
            bound: Vec::new(),
            resolver: ResolverLoan::Untouched,
        };

        for source in BIND_MOUNTS {
            let target = session.root.join(source.trim_start_matches('/'));
            fs::create_dir_all(&target).in_stage(STAGE)?;
            host.run_checked(
                &CommandSpec::new("mount")
                    .arg("--bind")
                    .arg(source)
                    .path_arg(&target),
            )
            .in_stage(STAGE)?;
            session.bound.push(target);
        }

        session.resolver = lend_resolver(&session.root, &config.host_resolv_conf)?;
        tracing::debug!(root = %session.root.display(), "chroot session open");
        Ok(session)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the script to `/tmp/<name>` inside the target and run it with
    /// bash. The file is removed whatever the outcome.
    pub fn run_script(&self, script: &GeneratedScript) -> Result<()> {
        let name = script.name;
        let inner = Path::new("/tmp").join(name);
        let on_disk = self.root.join("tmp").join(name);

        fs::create_dir_all(self.root.join("tmp")).in_stage(STAGE)?;
        stage_script(&on_disk, &script.body).in_stage(STAGE)?;

        let mut spec = CommandSpec::new("chroot")
            .path_arg(&self.root)
            .arg("/bin/bash")
            .path_arg(&inner);
        if let Some(input) = script.stdin() {
            spec = spec.stdin(input);
        }

        tracing::info!(script = name, "running inside target");
        let outcome = self.host.run(&spec);

        discard_script(&on_disk);

        let outcome = outcome.in_stage(STAGE)?;
        for line in outcome.stdout.lines() {
            tracing::debug!(script = name, "{line}");
        }
        if outcome.success() {
            Ok(())
        } else {
            Err(ProvisionError::SecondaryContext(format!(
                "{name} exited with {}: {}",
                outcome
                    .status
                    .map_or_else(|| "signal".to_string(), |code| code.to_string()),
                tail(&outcome.stderr, 5)
            )))
        }
    }

    /// Undo the resolver loan and the bind mounts, innermost first.
    /// Failures are logged; teardown picks up anything left behind.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Err(error) = return_resolver(&self.root, &self.resolver) {
            tracing::warn!("could not restore {RESOLV_CONF}: {error}");
        }
        self.resolver = ResolverLoan::Untouched;

        while let Some(target) = self.bound.pop() {
            let unmounted = self
                .host
                .run_checked(&CommandSpec::new("umount").path_arg(&target))
                .or_else(|_| {
                    self.host
                        .run_checked(&CommandSpec::new("umount").arg("-l").path_arg(&target))
                });
            if let Err(error) = unmounted {
                tracing::warn!("could not unmount {}: {error}", target.display());
            }
        }
        tracing::debug!(root = %self.root.display(), "chroot session closed");
    }
}

impl Drop for ChrootSession<'_> {
    fn drop(&mut self) {
        if !self.bound.is_empty() {
            self.release();
        }
    }
}

/// Copy the host's resolver file in when the target's is missing, empty or a
/// dangling link.
fn lend_resolver(root: &Path, host_resolv_conf: &Path) -> Result<ResolverLoan> {
    let path = root.join(RESOLV_CONF);
    let usable = fs::metadata(&path).is_ok_and(|meta| meta.len() > 0);
    if usable {
        return Ok(ResolverLoan::Untouched);
    }
    if !host_resolv_conf.is_file() {
        tracing::warn!(
            "{} unavailable, target has no name resolution",
            host_resolv_conf.display()
        );
        return Ok(ResolverLoan::Untouched);
    }

    let previous_link = fs::read_link(&path).ok();
    if fs::symlink_metadata(&path).is_ok() {
        fs::remove_file(&path).in_stage(STAGE)?;
    }
    fs::copy(host_resolv_conf, &path).in_stage(STAGE)?;

    Ok(match previous_link {
        Some(link) => ResolverLoan::ReplacedLink(link),
        None => ResolverLoan::Placed,
    })
}

fn return_resolver(root: &Path, loan: &ResolverLoan) -> std::io::Result<()> {
    let path = root.join(RESOLV_CONF);
    match loan {
        ResolverLoan::Untouched => Ok(()),
        ResolverLoan::Placed => fs::remove_file(path),
        ResolverLoan::ReplacedLink(link) => {
            fs::remove_file(&path)?;
            symlink(link, path)
        }
    }
}

/// Write an executable script. Nothing is left behind if either step fails.
fn stage_script(path: &Path, body: &str) -> std::io::Result<()> {
    let staged = fs::write(path, body)
        .and_then(|()| fs::set_permissions(path, Permissions::from_mode(0o755)));
    if staged.is_err() && path.exists() {
        discard_script(path);
    }
    staged
}

fn discard_script(path: &Path) {
    if let Err(error) = fs::remove_file(path) {
        tracing::warn!("could not remove {}: {error}", path.display());
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_is_lent_and_returned() {
        let root = tempfile::tempdir().unwrap();
        let host_conf = root.path().join("host-resolv.conf");
        fs::write(&host_conf, "nameserver 192.0.2.53\n").unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();

        let loan = lend_resolver(root.path(), &host_conf).unwrap();
        assert!(matches!(loan, ResolverLoan::Placed));
        assert_eq!(
            fs::read_to_string(root.path().join(RESOLV_CONF)).unwrap(),
            "nameserver 192.0.2.53\n"
        );

        return_resolver(root.path(), &loan).unwrap();
        assert!(!root.path().join(RESOLV_CONF).exists());
    }

    #[test]
    fn dangling_link_is_restored_after_use() {
        let root = tempfile::tempdir().unwrap();
        let host_conf = root.path().join("host-resolv.conf");
        fs::write(&host_conf, "nameserver 192.0.2.53\n").unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        let link = PathBuf::from("../run/systemd/resolve/stub-resolv.conf");
        symlink(&link, root.path().join(RESOLV_CONF)).unwrap();

        let loan = lend_resolver(root.path(), &host_conf).unwrap();
        assert!(matches!(&loan, ResolverLoan::ReplacedLink(previous) if *previous == link));

        return_resolver(root.path(), &loan).unwrap();
        assert_eq!(fs::read_link(root.path().join(RESOLV_CONF)).unwrap(), link);
    }

    #[test]
    fn populated_resolver_is_left_alone() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        fs::write(root.path().join(RESOLV_CONF), "nameserver 127.0.0.53\n").unwrap();

        let loan = lend_resolver(root.path(), Path::new("/nonexistent")).unwrap();
        assert!(matches!(loan, ResolverLoan::Untouched));
    }

    #[test]
    fn staged_script_is_executable() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("provision-users.sh");

        stage_script(&path, "#!/bin/bash\ntrue\n").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        discard_script(&path);
        assert!(!path.exists());
    }

    #[test]
    fn failed_staging_leaves_no_script() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("missing-tmp").join("provision-users.sh");

        assert!(stage_script(&path, "#!/bin/bash\n").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\n\nc\nd\n", 2), "c | d");
        assert_eq!(tail("", 3), "");
    }
}
