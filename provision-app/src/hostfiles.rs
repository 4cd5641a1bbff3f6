// SPDX-License-Identifier: GPL-3.0-only

//! Identity, package source and network files for the installed system

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::InstallConfig;

const COMPONENTS: &str = "main restricted universe multiverse";

pub const NETPLAN_PATH: &str = "etc/netplan/01-provision.yaml";

pub fn render_hostname(config: &InstallConfig) -> String {
    format!("{}\n", config.hostname)
}

pub fn render_hosts(config: &InstallConfig) -> String {
    format!(
        "127.0.0.1 localhost\n\
         127.0.1.1 {host}\n\
         \n\
         ::1 localhost ip6-localhost ip6-loopback\n\
         ff02::1 ip6-allnodes\n\
         ff02::2 ip6-allrouters\n",
        host = config.hostname
    )
}

pub fn render_sources(mirror: &str, suite: &str) -> String {
    ["", "-updates", "-security"]
        .iter()
        .map(|pocket| format!("deb {mirror} {suite}{pocket} {COMPONENTS}\n"))
        .collect()
}

/// DHCP on every wired interface, whatever the kernel names it.
pub fn render_netplan() -> &'static str {
    "network:\n\
     \x20 version: 2\n\
     \x20 renderer: networkd\n\
     \x20 ethernets:\n\
     \x20   wired-en:\n\
     \x20     match:\n\
     \x20       name: \"en*\"\n\
     \x20     dhcp4: true\n\
     \x20   wired-eth:\n\
     \x20     match:\n\
     \x20       name: \"eth*\"\n\
     \x20     dhcp4: true\n"
}

pub fn write(root: &Path, relative: &str, body: &str) -> io::Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)
}

/// Write hostname, hosts and sources.list. The netplan file is best effort.
pub fn write_all(config: &InstallConfig, root: &Path, mirror: &str) -> io::Result<()> {
    write(root, "etc/hostname", &render_hostname(config))?;
    write(root, "etc/hosts", &render_hosts(config))?;
    write(
        root,
        "etc/apt/sources.list",
        &render_sources(mirror, &config.distribution),
    )?;

    let netplan = write(root, NETPLAN_PATH, render_netplan()).and_then(|_| {
        fs::set_permissions(root.join(NETPLAN_PATH), Permissions::from_mode(0o600))
    });
    if let Err(error) = netplan {
        tracing::warn!("network configuration not written: {error}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_cover_release_updates_and_security() {
        let sources = render_sources("http://archive.ubuntu.com/ubuntu", "noble");
        assert_eq!(sources.lines().count(), 3);
        assert!(sources.contains("deb http://archive.ubuntu.com/ubuntu noble-security main restricted universe multiverse"));
    }

    #[test]
    fn hosts_map_hostname_to_loopback() {
        let mut config = InstallConfig::with_devices(vec![]);
        config.hostname = "vault".to_string();
        assert!(render_hosts(&config).contains("127.0.1.1 vault\n"));
        assert_eq!(render_hostname(&config), "vault\n");
    }

    #[test]
    fn netplan_indentation_is_spaces() {
        let yaml = render_netplan();
        assert!(yaml.contains("\n  ethernets:\n"));
        assert!(yaml.contains("\n        name: \"en*\"\n"));
        assert!(!yaml.contains('\t'));
    }

    #[test]
    fn writes_files_below_root() {
        let root = tempfile::tempdir().unwrap();
        let config = InstallConfig::with_devices(vec![]);
        write_all(&config, root.path(), "http://ports.ubuntu.com/ubuntu-ports").unwrap();

        assert_eq!(
            fs::read_to_string(root.path().join("etc/hostname")).unwrap(),
            "ubuntu\n"
        );
        assert!(root.path().join(NETPLAN_PATH).is_file());
    }
}
