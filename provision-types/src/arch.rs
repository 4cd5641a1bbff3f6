// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kernel meta packages tried in order by the package script. Ubuntu ships
/// the same names on every supported architecture.
pub const KERNEL_CANDIDATES: &[&str] =
    &["linux-generic", "linux-image-generic", "linux-image-virtual"];

/// CPU architectures the provisioner can install for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    /// Used when neither probe gives a recognisable answer.
    pub const FALLBACK: Architecture = Architecture::Amd64;

    /// Normalise the spellings reported by `dpkg --print-architecture` and `uname -m`.
    pub fn from_alias(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" | "x86-64" | "x64" => Some(Self::Amd64),
            "arm64" | "aarch64" | "armv8" | "armv8l" => Some(Self::Arm64),
            _ => None,
        }
    }

    /// Debian architecture name, as passed to debootstrap.
    pub fn debian_name(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }

    /// `grub-install --target` value.
    pub fn grub_target(self) -> &'static str {
        match self {
            Self::Amd64 => "x86_64-efi",
            Self::Arm64 => "arm64-efi",
        }
    }

    pub fn grub_package(self) -> &'static str {
        match self {
            Self::Amd64 => "grub-efi-amd64",
            Self::Arm64 => "grub-efi-arm64",
        }
    }

    pub fn default_mirror(self) -> &'static str {
        match self {
            Self::Amd64 => "http://archive.ubuntu.com/ubuntu",
            Self::Arm64 => "http://ports.ubuntu.com/ubuntu-ports",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.debian_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_kernel_and_dpkg_spellings() {
        assert_eq!(Architecture::from_alias("x86_64\n"), Some(Architecture::Amd64));
        assert_eq!(Architecture::from_alias("amd64"), Some(Architecture::Amd64));
        assert_eq!(Architecture::from_alias("aarch64"), Some(Architecture::Arm64));
        assert_eq!(Architecture::from_alias("ARM64"), Some(Architecture::Arm64));
        assert_eq!(Architecture::from_alias("riscv64"), None);
    }

    #[test]
    fn grub_target_follows_architecture() {
        assert_eq!(Architecture::Amd64.grub_target(), "x86_64-efi");
        assert_eq!(Architecture::Arm64.grub_target(), "arm64-efi");
    }
}
