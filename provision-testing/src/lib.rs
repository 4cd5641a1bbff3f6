// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles for the provisioner
//!
//! [`FakeHost`] models just enough of a Linux storage stack (partition
//! tables, md arrays, dm-crypt mappings, mounts, swaps and on-disk
//! signatures) for whole pipeline runs and teardowns to be replayed against it.
//! Files written below a target root still land on the real filesystem, so
//! tests point the target root at a temporary directory.

pub mod fake_host;
pub mod operator;

pub use fake_host::{FakeHost, HostSnapshot};
pub use operator::ScriptedOperator;
