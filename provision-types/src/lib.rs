// SPDX-License-Identifier: GPL-3.0-only

//! Domain models for the encrypted-root provisioner
//!
//! Everything in this crate is plain data: the immutable provisioning plan,
//! the fixed partition and subvolume layout, the mount tree and the files the
//! installed system reads at boot. Nothing here touches the host.
//!
//! - **provision-sys**: probes and runs host tooling, consumes these types
//! - **provision-app**: builds the plan once and threads it through every stage

pub mod arch;
pub mod descriptors;
pub mod layout;
pub mod luks;
pub mod mount_tree;
pub mod plan;
pub mod stage;
pub mod subvolume;

pub use arch::{Architecture, KERNEL_CANDIDATES};
pub use descriptors::{
    BackingDevice, CrypttabEntry, FstabContext, GRUB_FRAGMENT_PATH, SWAP_FILE_PATH,
    render_crypttab, render_fstab, render_grub_fragment,
};
pub use layout::{
    BOOT_PARTITION_OFFSET_BYTES, BOOT_PARTITION_SIZE_BYTES, MIB, PartitionLayout, PartitionRole,
    PartitionSpec, partition_path,
};
pub use luks::{CryptsetupVersion, LuksOptionTier, OPTION_TIERS, negotiate_tier};
pub use mount_tree::{BOOT_MOUNT_PATH, MountBinding, MountSource, MountTree};
pub use plan::{PlanError, ProvisioningPlan};
pub use stage::Stage;
pub use subvolume::Subvolume;
