// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use serde::Serialize;

/// Construction stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Partition,
    Redundancy,
    Encryption,
    Filesystem,
    Mount,
    BaseSystem,
    SecondaryContext,
    Bootloader,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Partition => "partition",
            Self::Redundancy => "redundancy",
            Self::Encryption => "encryption",
            Self::Filesystem => "filesystem",
            Self::Mount => "mount",
            Self::BaseSystem => "base-system",
            Self::SecondaryContext => "secondary-context",
            Self::Bootloader => "bootloader",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
