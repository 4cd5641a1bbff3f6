// SPDX-License-Identifier: GPL-3.0-only

//! Host-side plumbing for the provisioner
//!
//! Two seams separate the pipeline from the machine it runs on:
//! - [`CommandRunner`]: runs external tools (`sgdisk`, `mdadm`, `cryptsetup`, ...)
//! - [`HostProbe`]: side-effect-free reads of kernel state (mount table,
//!   `/proc/mdstat`, device-mapper registry, swaps, signatures)
//!
//! [`LinuxHost`] implements both against the live system. Nothing in the
//! provisioner keeps its own record of what it built; every decision is made
//! from a fresh probe.

pub mod command;
pub mod devmapper;
pub mod error;
pub mod linux;
pub mod mdstat;
pub mod mountinfo;
pub mod operator;
pub mod probe;
pub mod process_finder;
pub mod settle;
pub mod swaps;

pub use command::{CommandOutcome, CommandRunner, CommandSpec};
pub use devmapper::DmMapping;
pub use error::{Result, SysError};
pub use linux::LinuxHost;
pub use mdstat::{ArrayDescriptor, MdArray, parse_detail_scan, parse_proc_mdstat};
pub use mountinfo::{MountEntry, parse_mountinfo};
pub use operator::{Operator, TerminalOperator};
pub use probe::{Host, HostProbe};
pub use process_finder::{KillResult, ProcessInfo};
pub use settle::wait_until;
pub use swaps::parse_proc_swaps;
