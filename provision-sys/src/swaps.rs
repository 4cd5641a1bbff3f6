// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use crate::mountinfo::unescape_mount_field;

pub const SWAPS_PATH: &str = "/proc/swaps";

/// Active swap areas from `/proc/swaps`.
pub fn parse_proc_swaps(input: &str) -> Vec<PathBuf> {
    input
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(|field| PathBuf::from(unescape_mount_field(field)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_header_line() {
        let swaps = parse_proc_swaps(
            "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n\
             /mnt/swap/swapfile                      file\t\t16777212\t0\t\t-2\n\
             /dev/zram0                              partition\t8388604\t\t0\t\t100\n",
        );
        assert_eq!(
            swaps,
            vec![
                PathBuf::from("/mnt/swap/swapfile"),
                PathBuf::from("/dev/zram0")
            ]
        );
    }

    #[test]
    fn empty_table_has_no_entries() {
        assert!(parse_proc_swaps("Filename Type Size Used Priority\n").is_empty());
    }
}
