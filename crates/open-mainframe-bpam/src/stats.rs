//! Member statistics payload: codec and pure update rule.
//!
//! The payload travels as directory-entry user data. Wire form, 30 bytes
//! (15 halfwords), big-endian:
//!
//! ```text
//! +0   version            1 byte
//! +1   modification level 1 byte, 0x00-0x99 saturating
//! +2   flags              1 byte
//! +3   modified seconds   1 byte, packed decimal SS
//! +4   created date       4 bytes, packed decimal 0CYYDDDF
//! +8   modified date      4 bytes, packed decimal 0CYYDDDF
//! +12  modified time      2 bytes, packed decimal HHMM
//! +14  current lines      2 bytes
//! +16  initial lines      2 bytes
//! +18  modified lines     2 bytes
//! +20  owner id           8 bytes, blank-padded
//! +28  reserved           2 bytes, zero
//! ```
//!
//! 28-byte payloads written by tools that omit the reserved bytes decode
//! the same way; encode always emits 30.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::MAX_USER_DATA_LEN;

/// Encoded payload length.
pub const STATS_LEN: usize = 30;
/// Shortest payload accepted by the decoder.
pub const STATS_MIN_LEN: usize = 28;
/// Modification level ceiling.
pub const MAX_MOD_LEVEL: u8 = 0x99;

/// Per-member statistics stored as directory user data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStats {
    /// Version number, 1 on creation.
    pub version: u8,
    /// Modification level, saturating at [`MAX_MOD_LEVEL`].
    pub mod_level: u8,
    /// Flag byte.
    pub flags: u8,
    /// Creation date, packed 0CYYDDDF.
    pub created: u32,
    /// Last-modified date, packed 0CYYDDDF.
    pub modified: u32,
    /// Last-modified time of day, packed HHMM.
    pub modified_time: u16,
    /// Last-modified seconds, packed SS.
    pub modified_seconds: u8,
    /// Lines after the last completed write.
    pub current_lines: u16,
    /// Lines at creation.
    pub initial_lines: u16,
    /// Lines touched by the last write.
    pub modified_lines: u16,
    /// Owner user id (1-8 characters).
    pub owner: String,
}

impl MemberStats {
    /// Encode to the 30-byte wire form.
    pub fn encode(&self) -> [u8; STATS_LEN] {
        let mut out = [0u8; STATS_LEN];
        out[0] = self.version;
        out[1] = self.mod_level;
        out[2] = self.flags;
        out[3] = self.modified_seconds;
        out[4..8].copy_from_slice(&self.created.to_be_bytes());
        out[8..12].copy_from_slice(&self.modified.to_be_bytes());
        out[12..14].copy_from_slice(&self.modified_time.to_be_bytes());
        out[14..16].copy_from_slice(&self.current_lines.to_be_bytes());
        out[16..18].copy_from_slice(&self.initial_lines.to_be_bytes());
        out[18..20].copy_from_slice(&self.modified_lines.to_be_bytes());
        let mut owner = [b' '; 8];
        for (i, b) in self.owner.to_uppercase().bytes().take(8).enumerate() {
            owner[i] = b;
        }
        out[20..28].copy_from_slice(&owner);
        out
    }

    /// Decode from directory user data.
    ///
    /// Returns `None` when the bytes are not a recognizable statistics
    /// payload; the pathway then creates a fresh one, matching the
    /// reference auto-create behavior.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < STATS_MIN_LEN || bytes.len() > MAX_USER_DATA_LEN {
            return None;
        }
        Some(Self {
            version: bytes[0],
            mod_level: bytes[1],
            flags: bytes[2],
            modified_seconds: bytes[3],
            created: u32::from_be_bytes(bytes[4..8].try_into().ok()?),
            modified: u32::from_be_bytes(bytes[8..12].try_into().ok()?),
            modified_time: u16::from_be_bytes(bytes[12..14].try_into().ok()?),
            current_lines: u16::from_be_bytes(bytes[14..16].try_into().ok()?),
            initial_lines: u16::from_be_bytes(bytes[16..18].try_into().ok()?),
            modified_lines: u16::from_be_bytes(bytes[18..20].try_into().ok()?),
            owner: String::from_utf8_lossy(&bytes[20..28]).trim_end().to_string(),
        })
    }
}

/// Produce the statistics payload for a completed write pass.
///
/// No prior payload: version 1, level 0, created = modified = `now`, all
/// line counts = `lines_written`. Prior payload: level +1 saturating at
/// [`MAX_MOD_LEVEL`], modified timestamp and owner refreshed,
/// current/modified counts replaced, initial count and creation date
/// preserved. Pure and deterministic.
pub fn compute_stats(
    existing: Option<&MemberStats>,
    lines_written: usize,
    owner: &str,
    now: DateTime<Utc>,
) -> MemberStats {
    let lines = lines_written.min(u16::MAX as usize) as u16;
    let date = pack_julian_date(&now);

    match existing {
        None => MemberStats {
            version: 1,
            mod_level: 0,
            flags: 0,
            created: date,
            modified: date,
            modified_time: pack_hhmm(&now),
            modified_seconds: pack_bcd(now.second() as u8),
            current_lines: lines,
            initial_lines: lines,
            modified_lines: lines,
            owner: owner.trim().to_uppercase(),
        },
        Some(prior) => MemberStats {
            version: prior.version,
            mod_level: bump_level(prior.mod_level),
            flags: prior.flags,
            created: prior.created,
            modified: date,
            modified_time: pack_hhmm(&now),
            modified_seconds: pack_bcd(now.second() as u8),
            current_lines: lines,
            initial_lines: prior.initial_lines,
            modified_lines: lines,
            owner: owner.trim().to_uppercase(),
        },
    }
}

fn bump_level(level: u8) -> u8 {
    if level >= MAX_MOD_LEVEL {
        MAX_MOD_LEVEL
    } else {
        level + 1
    }
}

/// Pack a date as 0CYYDDDF: C = century (0 for 19xx, 1 for 20xx),
/// YY = year in century, DDD = Julian day, F = 0xC positive sign.
pub fn pack_julian_date(dt: &DateTime<Utc>) -> u32 {
    let year = dt.year();
    let century = if year >= 2000 { 1u8 } else { 0u8 };
    let yy = (year % 100) as u8;
    let ddd = dt.ordinal() as u16;

    let b0 = century & 0x0F;
    let b1 = pack_bcd(yy);
    let b2 = ((ddd / 100) as u8) << 4 | ((ddd / 10) % 10) as u8;
    let b3 = ((ddd % 10) as u8) << 4 | 0x0C;

    u32::from_be_bytes([b0, b1, b2, b3])
}

/// Pack a time of day as HHMM, one BCD byte each.
fn pack_hhmm(dt: &DateTime<Utc>) -> u16 {
    u16::from_be_bytes([pack_bcd(dt.hour() as u8), pack_bcd(dt.minute() as u8)])
}

/// Two-digit BCD byte.
fn pack_bcd(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, hh, mm, ss).unwrap()
    }

    #[test]
    fn create_sets_level_zero_and_all_counts() {
        let s = compute_stats(None, 5, "ibmuser", at(2026, 2, 23, 14, 25, 36));
        assert_eq!(s.version, 1);
        assert_eq!(s.mod_level, 0);
        assert_eq!(s.current_lines, 5);
        assert_eq!(s.initial_lines, 5);
        assert_eq!(s.modified_lines, 5);
        assert_eq!(s.owner, "IBMUSER");
        assert_eq!(s.created, s.modified);
    }

    #[test]
    fn update_bumps_level_and_preserves_initial() {
        let prior = compute_stats(None, 10, "USERA", at(2025, 1, 1, 0, 0, 0));
        let s = compute_stats(Some(&prior), 3, "USERB", at(2026, 6, 1, 9, 30, 0));
        assert_eq!(s.mod_level, 1);
        assert_eq!(s.current_lines, 3);
        assert_eq!(s.modified_lines, 3);
        assert_eq!(s.initial_lines, 10);
        assert_eq!(s.created, prior.created);
        assert_ne!(s.modified, prior.modified);
        assert_eq!(s.owner, "USERB");
    }

    #[test]
    fn level_saturates_at_0x99() {
        let mut prior = compute_stats(None, 1, "U", at(2026, 1, 1, 0, 0, 0));
        prior.mod_level = 0x98;
        let s = compute_stats(Some(&prior), 1, "U", at(2026, 1, 2, 0, 0, 0));
        assert_eq!(s.mod_level, 0x99);
        let s2 = compute_stats(Some(&s), 1, "U", at(2026, 1, 3, 0, 0, 0));
        assert_eq!(s2.mod_level, 0x99);
    }

    #[test]
    fn julian_date_packing() {
        // 2026-02-23 is Julian day 54: 0x0126054C
        let d = pack_julian_date(&at(2026, 2, 23, 0, 0, 0));
        assert_eq!(d, 0x0126_054C);

        // 1999-12-31 is Julian day 365 in the 1900s: 0x0099365C
        let d = pack_julian_date(&at(1999, 12, 31, 0, 0, 0));
        assert_eq!(d, 0x0099_365C);
    }

    #[test]
    fn encode_layout_is_exact() {
        let s = compute_stats(None, 5, "IBMUSER", at(2026, 2, 23, 14, 25, 36));
        let bytes = s.encode();
        assert_eq!(bytes.len(), STATS_LEN);
        assert_eq!(bytes[0], 1); // version
        assert_eq!(bytes[1], 0); // level
        assert_eq!(bytes[3], 0x36); // seconds BCD
        assert_eq!(&bytes[4..8], &0x0126_054Cu32.to_be_bytes());
        assert_eq!(&bytes[12..14], &[0x14, 0x25]); // HHMM BCD
        assert_eq!(&bytes[14..16], &[0, 5]); // current
        assert_eq!(&bytes[20..28], b"IBMUSER ");
        assert_eq!(&bytes[28..30], &[0, 0]); // reserved
    }

    #[test]
    fn decode_roundtrip_and_short_form() {
        let s = compute_stats(None, 42, "OWNER1", at(2026, 7, 4, 1, 2, 3));
        let bytes = s.encode();
        assert_eq!(MemberStats::decode(&bytes).unwrap(), s);

        // 28-byte form without the reserved tail
        assert_eq!(MemberStats::decode(&bytes[..28]).unwrap(), s);
    }

    #[test]
    fn decode_rejects_unrecognizable_payloads() {
        assert!(MemberStats::decode(&[]).is_none());
        assert!(MemberStats::decode(&[0u8; 10]).is_none());
        assert!(MemberStats::decode(&[0u8; 63]).is_none());
    }

    #[test]
    fn line_counts_saturate() {
        let s = compute_stats(None, 100_000, "U", at(2026, 1, 1, 0, 0, 0));
        assert_eq!(s.current_lines, u16::MAX);
    }
}
