// SPDX-License-Identifier: GPL-3.0-only

//! cryptsetup option negotiation

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CryptsetupVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl CryptsetupVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the first dotted version found in `cryptsetup --version` output,
    /// e.g. `cryptsetup 2.7.0 flags: UDEV BLKID KEYRING`.
    pub fn parse(output: &str) -> Option<Self> {
        output.split_whitespace().find_map(|token| {
            let token = token.trim_start_matches('v');
            let mut parts = token.split('.');
            let major = parts.next()?.parse().ok()?;
            let minor = parts.next()?.parse().ok()?;
            let patch = match parts.next() {
                Some(raw) => {
                    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
                    digits.parse().ok()?
                }
                None => 0,
            };
            Some(Self::new(major, minor, patch))
        })
    }
}

impl fmt::Display for CryptsetupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LuksOptionTier {
    Legacy,
    Reduced,
    Full,
}

/// Highest entry whose minimum version is met wins. Kept sorted descending.
pub const OPTION_TIERS: &[(CryptsetupVersion, LuksOptionTier)] = &[
    (CryptsetupVersion::new(2, 1, 0), LuksOptionTier::Full),
    (CryptsetupVersion::new(2, 0, 0), LuksOptionTier::Reduced),
];

/// Pick the option tier for a detected version; `None` means the version
/// could not be determined and selects the legacy options.
pub fn negotiate_tier(version: Option<CryptsetupVersion>) -> LuksOptionTier {
    let Some(version) = version else {
        return LuksOptionTier::Legacy;
    };

    OPTION_TIERS
        .iter()
        .find(|(minimum, _)| version >= *minimum)
        .map(|(_, tier)| *tier)
        .unwrap_or(LuksOptionTier::Legacy)
}

impl LuksOptionTier {
    /// Options passed to `cryptsetup luksFormat` ahead of the device.
    pub fn format_args(self) -> Vec<&'static str> {
        match self {
            Self::Full => vec![
                "--type",
                "luks2",
                "--cipher",
                "aes-xts-plain64",
                "--key-size",
                "512",
                "--hash",
                "sha512",
                "--pbkdf",
                "argon2id",
                "--iter-time",
                "4000",
                "--pbkdf-memory",
                "1048576",
                "--pbkdf-parallel",
                "4",
            ],
            Self::Reduced => vec![
                "--type",
                "luks2",
                "--cipher",
                "aes-xts-plain64",
                "--key-size",
                "512",
            ],
            Self::Legacy => vec!["--cipher", "aes-xts-plain64"],
        }
    }
}

impl fmt::Display for LuksOptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full => "full",
            Self::Reduced => "reduced",
            Self::Legacy => "legacy",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cryptsetup_banner() {
        assert_eq!(
            CryptsetupVersion::parse("cryptsetup 2.7.0 flags: UDEV BLKID KEYRING\n"),
            Some(CryptsetupVersion::new(2, 7, 0))
        );
        assert_eq!(
            CryptsetupVersion::parse("cryptsetup 1.6.6"),
            Some(CryptsetupVersion::new(1, 6, 6))
        );
        assert_eq!(
            CryptsetupVersion::parse("cryptsetup 2.2.2-rc1"),
            Some(CryptsetupVersion::new(2, 2, 2))
        );
        assert_eq!(CryptsetupVersion::parse("cryptsetup unknown"), None);
    }

    #[test]
    fn tier_boundaries() {
        let tier = |major, minor, patch| {
            negotiate_tier(Some(CryptsetupVersion::new(major, minor, patch)))
        };
        assert_eq!(tier(2, 7, 0), LuksOptionTier::Full);
        assert_eq!(tier(2, 1, 0), LuksOptionTier::Full);
        assert_eq!(tier(2, 0, 6), LuksOptionTier::Reduced);
        assert_eq!(tier(2, 0, 0), LuksOptionTier::Reduced);
        assert_eq!(tier(1, 7, 5), LuksOptionTier::Legacy);
        assert_eq!(negotiate_tier(None), LuksOptionTier::Legacy);
    }

    #[test]
    fn selection_is_monotonic_in_version() {
        let mut previous = LuksOptionTier::Legacy;
        for major in 0..4 {
            for minor in 0..10 {
                for patch in [0, 5] {
                    let selected =
                        negotiate_tier(Some(CryptsetupVersion::new(major, minor, patch)));
                    assert!(selected >= previous, "{major}.{minor}.{patch}");
                    previous = selected;
                }
            }
        }
    }

    #[test]
    fn table_is_sorted_descending() {
        assert!(OPTION_TIERS.windows(2).all(|pair| pair[0].0 > pair[1].0));
    }

    #[test]
    fn full_tier_uses_argon2id() {
        let args = LuksOptionTier::Full.format_args();
        assert!(args.windows(2).any(|w| w == ["--pbkdf", "argon2id"]));
        assert_eq!(LuksOptionTier::Legacy.format_args(), vec!["--cipher", "aes-xts-plain64"]);
    }
}
