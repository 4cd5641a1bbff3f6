// SPDX-License-Identifier: GPL-3.0-only

//! Destructive provisioner: GPT, optional RAID1 mirror, LUKS, btrfs
//! subvolumes, a debootstrapped base system and GRUB on every member disk,
//! with a teardown engine that can undo any part of it.

pub mod chroot;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod control;
pub mod error;
pub mod hostfiles;
pub mod logging;
pub mod pipeline;
pub mod prober;
pub mod prompt;
pub mod stages;
pub mod teardown;

pub use cli::{Cli, Mode, usage_exit_code};
pub use config::InstallConfig;
pub use control::RunControl;
pub use error::{InterruptSignal, ProvisionError, Result};
pub use pipeline::{Collaborators, Outcome, execute};
pub use stages::base_system::{Bootstrapper, Debootstrap};
