//! Snapshot directory names.
//!
//! `vault_backup_20250131_235959_042` sorts lexicographically in creation
//! order. Names without the millisecond suffix are still recognised.

use chrono::{NaiveDateTime, Timelike};

pub const SNAPSHOT_PREFIX: &str = "vault_backup_";

const SECONDS_FORMAT: &str = "%Y%m%d_%H%M%S";
const SECONDS_LEN: usize = 15;

pub fn snapshot_name(stamp: NaiveDateTime) -> String {
    format!("{SNAPSHOT_PREFIX}{}", stamp.format("%Y%m%d_%H%M%S_%3f"))
}

/// Creation time encoded in `name`, or `None` if it is not a snapshot name.
pub fn parse_snapshot_name(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(SNAPSHOT_PREFIX)?;
    let seconds = stamp.get(..SECONDS_LEN)?;
    let millis = match stamp.get(SECONDS_LEN..)? {
        "" => 0,
        rest => {
            let digits = rest.strip_prefix('_')?;
            if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse::<u32>().ok()?
        }
    };
    NaiveDateTime::parse_from_str(seconds, SECONDS_FORMAT)
        .ok()?
        .with_nanosecond(millis * 1_000_000)
}

/// Plain single-component names only: no separators, no `.` or `..`.
pub fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\'])
}
