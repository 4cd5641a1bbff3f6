// SPDX-License-Identifier: GPL-3.0-only

//! Install settings: defaults, optional TOML file, then command-line flags

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use provision_types::Architecture;
use serde::Deserialize;

use crate::cli::Cli;
use crate::error::{ProvisionError, Result};
use crate::prompt::Secret;

pub const PASSPHRASE_ENV: &str = "PROVISION_ENCRYPTION_PASSPHRASE";
pub const USER_PASSWORD_ENV: &str = "PROVISION_USER_PASSWORD";

const DEFAULT_HOSTNAME: &str = "ubuntu";
const DEFAULT_USERNAME: &str = "ubuntu";
const DEFAULT_DISTRIBUTION: &str = "noble";
const DEFAULT_MAPPING_NAME: &str = "cryptroot";
const DEFAULT_ARRAY_DEVICE: &str = "/dev/md0";
const DEFAULT_TARGET_ROOT: &str = "/mnt";
const DEFAULT_STAGING_DIR: &str = "/run/provision";
const DEFAULT_HOST_ARRAY_CONFIG: &str = "/etc/mdadm/mdadm.conf";
const DEFAULT_HOST_RESOLV_CONF: &str = "/etc/resolv.conf";
const DEFAULT_LOCALE: &str = "en_US.UTF-8";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_SETTLE_TIMEOUT_SECS: u64 = 30;

/// Shape of the optional `--config` file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub devices: Vec<PathBuf>,
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub distribution: Option<String>,
    pub mirror: Option<String>,
    pub swap_size_gib: Option<u64>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
    pub mapping_name: Option<String>,
    pub array_device: Option<PathBuf>,
    pub target_root: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub host_array_config: Option<PathBuf>,
    pub settle_timeout_secs: Option<u64>,
    pub extra_packages: Vec<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| {
            ProvisionError::Configuration(format!("cannot read {}: {error}", path.display()))
        })?;
        Self::parse(&raw).map_err(|error| {
            ProvisionError::Configuration(format!("invalid {}: {error}", path.display()))
        })
    }

    pub fn parse(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Settings for one run. Built once, then only ever borrowed.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    pub devices: Vec<PathBuf>,
    pub hostname: String,
    pub username: String,
    pub distribution: String,
    /// `None` picks the archive for the detected architecture.
    pub mirror: Option<String>,
    pub swap_size_gib: u64,
    pub locale: String,
    pub timezone: String,
    pub mapping_name: String,
    pub array_device: PathBuf,
    pub target_root: PathBuf,
    pub staging_dir: PathBuf,
    pub host_array_config: PathBuf,
    pub host_resolv_conf: PathBuf,
    pub settle_timeout: Duration,
    pub extra_packages: Vec<String>,
    pub encryption_passphrase: Option<Secret>,
    pub user_password: Option<Secret>,
}

impl InstallConfig {
    pub fn with_devices(devices: Vec<PathBuf>) -> Self {
        Self::from_file(FileConfig {
            devices,
            ..FileConfig::default()
        })
    }

    pub fn from_file(file: FileConfig) -> Self {
        Self {
            devices: file.devices,
            hostname: file.hostname.unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
            username: file.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            distribution: file
                .distribution
                .unwrap_or_else(|| DEFAULT_DISTRIBUTION.to_string()),
            mirror: file.mirror,
            swap_size_gib: file.swap_size_gib.unwrap_or(0),
            locale: file.locale.unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            timezone: file.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            mapping_name: file
                .mapping_name
                .unwrap_or_else(|| DEFAULT_MAPPING_NAME.to_string()),
            array_device: file
                .array_device
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARRAY_DEVICE)),
            target_root: file
                .target_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_ROOT)),
            staging_dir: file
                .staging_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STAGING_DIR)),
            host_array_config: file
                .host_array_config
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HOST_ARRAY_CONFIG)),
            host_resolv_conf: PathBuf::from(DEFAULT_HOST_RESOLV_CONF),
            settle_timeout: Duration::from_secs(
                file.settle_timeout_secs
                    .unwrap_or(DEFAULT_SETTLE_TIMEOUT_SECS),
            ),
            extra_packages: file.extra_packages,
            encryption_passphrase: None,
            user_password: None,
        }
    }

    /// Merge the config file, the command line and the environment.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let mut config = Self::from_file(file);

        if !cli.devices.is_empty() {
            config.devices = cli.devices.clone();
        }
        if let Some(hostname) = &cli.hostname {
            config.hostname = hostname.clone();
        }
        if let Some(username) = &cli.username {
            config.username = username.clone();
        }
        if let Some(distribution) = &cli.distribution {
            config.distribution = distribution.clone();
        }
        if let Some(mirror) = &cli.mirror {
            config.mirror = Some(mirror.clone());
        }
        if let Some(swap) = cli.swap_size {
            config.swap_size_gib = swap;
        }

        config.encryption_passphrase = secret_from_env(PASSPHRASE_ENV);
        config.user_password = secret_from_env(USER_PASSWORD_ENV);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !valid_hostname(&self.hostname) {
            return Err(ProvisionError::Configuration(format!(
                "invalid hostname {:?}",
                self.hostname
            )));
        }
        if !valid_username(&self.username) {
            return Err(ProvisionError::Configuration(format!(
                "invalid username {:?}",
                self.username
            )));
        }
        if self.mapping_name.is_empty()
            || self
                .mapping_name
                .contains(|c: char| c == '/' || c.is_whitespace())
        {
            return Err(ProvisionError::Configuration(format!(
                "invalid mapping name {:?}",
                self.mapping_name
            )));
        }
        if !self.target_root.is_absolute() || self.target_root == Path::new("/") {
            return Err(ProvisionError::Configuration(format!(
                "target root must be an absolute path other than /, got {}",
                self.target_root.display()
            )));
        }
        if self.distribution.trim().is_empty() {
            return Err(ProvisionError::Configuration(
                "distribution must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mirror_for(&self, architecture: Architecture) -> String {
        self.mirror
            .clone()
            .unwrap_or_else(|| architecture.default_mirror().to_string())
    }

    /// `/dev/mapper/<mapping>`
    pub fn mapping_device(&self) -> PathBuf {
        Path::new("/dev/mapper").join(&self.mapping_name)
    }

    /// Where the array descriptor waits until the target root exists.
    pub fn staged_array_config(&self) -> PathBuf {
        self.staging_dir.join("mdadm.conf")
    }
}

fn secret_from_env(name: &str) -> Option<Secret> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Secret::new)
}

fn valid_hostname(name: &str) -> bool {
    (1..=63).contains(&name.len())
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn valid_username(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 32
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
