// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "provision", version)]
#[command(
    about = "Build an encrypted, optionally mirrored btrfs root on raw disks and install a base system"
)]
#[command(
    after_help = "Every device named with --device is erased. Two or more devices are mirrored with mdadm."
)]
pub struct Cli {
    /// Target disk; repeat the flag to mirror across several disks
    #[arg(short = 'd', long = "device", value_name = "DEVICE")]
    pub devices: Vec<PathBuf>,

    /// Tear down existing RAID, LUKS and partition state on the targets, then install
    #[arg(long, conflicts_with_all = ["cleanup", "show_plan"])]
    pub force: bool,

    /// Remove every storage layer from the targets and exit
    #[arg(long, conflicts_with = "show_plan")]
    pub cleanup: bool,

    /// Print the derived provisioning plan as JSON and exit
    #[arg(long)]
    pub show_plan: bool,

    /// TOML file with install settings; flags take precedence
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub hostname: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    /// Swap file size in GiB, 0 disables swap
    #[arg(long, value_name = "GIB")]
    pub swap_size: Option<u64>,

    /// Distribution codename passed to debootstrap
    #[arg(long, value_name = "SUITE")]
    pub distribution: Option<String>,

    /// Package archive URL
    #[arg(long, value_name = "URL")]
    pub mirror: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Install { force: bool },
    Cleanup,
    ShowPlan,
}

/// Exit status for a command line clap rejected or answered itself. Help and
/// version output succeed; anything else is a fatal usage error.
pub fn usage_exit_code(error: &clap::Error) -> u8 {
    u8::from(error.use_stderr())
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.show_plan {
            Mode::ShowPlan
        } else if self.cleanup {
            Mode::Cleanup
        } else {
            Mode::Install { force: self.force }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_device_flag_keeps_order() {
        let cli = Cli::try_parse_from(["provision", "-d", "/dev/sdb", "--device", "/dev/sda"])
            .unwrap();
        assert_eq!(
            cli.devices,
            vec![PathBuf::from("/dev/sdb"), PathBuf::from("/dev/sda")]
        );
        assert_eq!(cli.mode(), Mode::Install { force: false });
    }

    #[test]
    fn modes_are_exclusive() {
        assert!(Cli::try_parse_from(["provision", "--force", "--cleanup"]).is_err());
        assert!(Cli::try_parse_from(["provision", "--cleanup", "--show-plan"]).is_err());
        let cli = Cli::try_parse_from(["provision", "--cleanup", "-d", "/dev/vda"]).unwrap();
        assert_eq!(cli.mode(), Mode::Cleanup);
    }

    #[test]
    fn usage_errors_exit_one_and_help_exits_zero() {
        let code = |args: &[&str]| usage_exit_code(&Cli::try_parse_from(args).unwrap_err());
        assert_eq!(code(&["provision", "--bogus"]), 1);
        assert_eq!(code(&["provision", "--swap-size", "big"]), 1);
        assert_eq!(code(&["provision", "--help"]), 0);
        assert_eq!(code(&["provision", "--version"]), 0);
    }

    #[test]
    fn swap_size_must_be_numeric() {
        assert!(Cli::try_parse_from(["provision", "--swap-size", "big"]).is_err());
        let cli = Cli::try_parse_from(["provision", "--swap-size", "16"]).unwrap();
        assert_eq!(cli.swap_size, Some(16));
    }
}
