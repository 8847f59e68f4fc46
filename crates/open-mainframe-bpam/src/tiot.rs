//! Task I/O table: binary ddname-to-device mapping for one task.
//!
//! The table is a 24-byte header (job name plus two step names) followed
//! by self-describing entries. Each entry carries its own length in byte
//! 0, the blank-padded ddname at bytes 4..12, and a device word at bytes
//! 16..20 whose low 24 bits are the device token (the top byte is a
//! status byte and is masked off). A zero length byte ends the table.

use crate::error::BpamError;
use crate::types::DeviceToken;

/// Header length: 8-byte job name + 8-byte proc step name + 8-byte step name.
pub const HEADER_LEN: usize = 24;
/// Minimum length of a single-device entry.
pub const ENTRY_MIN_LEN: usize = 20;

const DDNAME_OFFSET: usize = 4;
const DEVICE_WORD_OFFSET: usize = 16;

/// A task's I/O table in its wire form.
#[derive(Debug, Clone)]
pub struct TaskIoTable {
    bytes: Vec<u8>,
}

impl TaskIoTable {
    /// Create an empty table for a job step.
    pub fn new(jobname: &str, procstep: &str, stepname: &str) -> Self {
        let mut bytes = Vec::with_capacity(HEADER_LEN + 4);
        bytes.extend_from_slice(&pad8(jobname));
        bytes.extend_from_slice(&pad8(procstep));
        bytes.extend_from_slice(&pad8(stepname));
        // end-of-table marker
        bytes.extend_from_slice(&[0u8; 4]);
        Self { bytes }
    }

    /// Wrap a table supplied by the embedder in its binary form.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw table bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append a single-device entry for `ddname`.
    pub fn push_entry(&mut self, ddname: &str, device: DeviceToken) -> Result<(), BpamError> {
        let name = ddname.trim();
        if name.is_empty() || name.len() > 8 {
            return Err(BpamError::DeviceResolution {
                ddname: ddname.to_string(),
                reason: "ddname must be 1-8 characters".to_string(),
            });
        }

        let mut entry = [0u8; ENTRY_MIN_LEN];
        entry[0] = ENTRY_MIN_LEN as u8;
        entry[DDNAME_OFFSET..DDNAME_OFFSET + 8].copy_from_slice(&pad8(name));
        entry[DEVICE_WORD_OFFSET..DEVICE_WORD_OFFSET + 4].copy_from_slice(&device.raw().to_be_bytes());

        // insert ahead of the 4-byte end marker
        let insert_at = self.bytes.len().saturating_sub(4);
        self.bytes.splice(insert_at..insert_at, entry.iter().copied());
        Ok(())
    }

    /// Walk the table and resolve `ddname` to its device token.
    ///
    /// Read-only: the table is never modified by resolution.
    pub fn resolve(&self, ddname: &str) -> Result<DeviceToken, BpamError> {
        let want = pad8(ddname.trim());
        let mut off = HEADER_LEN;

        while off < self.bytes.len() {
            let entry_len = self.bytes[off] as usize;
            if entry_len == 0 {
                break;
            }
            if entry_len < ENTRY_MIN_LEN || off + entry_len > self.bytes.len() {
                return Err(BpamError::DeviceResolution {
                    ddname: ddname.to_string(),
                    reason: format!("malformed I/O table entry at offset {off}"),
                });
            }

            if self.bytes[off + DDNAME_OFFSET..off + DDNAME_OFFSET + 8] == want {
                let word = u32::from_be_bytes(
                    self.bytes[off + DEVICE_WORD_OFFSET..off + DEVICE_WORD_OFFSET + 4]
                        .try_into()
                        .expect("slice is 4 bytes"),
                );
                let token = DeviceToken::new(word);
                if token.is_zero() {
                    return Err(BpamError::DeviceResolution {
                        ddname: ddname.to_string(),
                        reason: "entry carries a zero device token".to_string(),
                    });
                }
                return Ok(token);
            }

            off += entry_len;
        }

        Err(BpamError::DeviceResolution {
            ddname: ddname.to_string(),
            reason: "no matching entry in the task I/O table".to_string(),
        })
    }
}

/// Blank-pad a name to 8 bytes, uppercased.
fn pad8(name: &str) -> [u8; 8] {
    let mut out = [b' '; 8];
    for (i, b) in name.to_uppercase().bytes().take(8).enumerate() {
        out[i] = b;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TaskIoTable {
        let mut t = TaskIoTable::new("MYJOB", "", "STEP1");
        t.push_entry("SYSUT1", DeviceToken::new(0x00A3F0)).unwrap();
        t.push_entry("SYSUT2", DeviceToken::new(0x00B410)).unwrap();
        t
    }

    #[test]
    fn resolve_matches_ddname_case_insensitively() {
        let t = table();
        assert_eq!(t.resolve("sysut1").unwrap().raw(), 0x00A3F0);
        assert_eq!(t.resolve("SYSUT2").unwrap().raw(), 0x00B410);
    }

    #[test]
    fn resolve_unknown_ddname_fails() {
        let err = table().resolve("NODD").unwrap_err();
        assert!(matches!(err, BpamError::DeviceResolution { .. }));
    }

    #[test]
    fn resolve_masks_status_byte_in_device_word() {
        // hand-build an entry whose device word has a status byte set
        let mut t = TaskIoTable::new("J", "", "S");
        let insert_at = t.bytes.len() - 4;
        let mut entry = [0u8; ENTRY_MIN_LEN];
        entry[0] = ENTRY_MIN_LEN as u8;
        entry[DDNAME_OFFSET..DDNAME_OFFSET + 8].copy_from_slice(b"OUT     ");
        entry[DEVICE_WORD_OFFSET..DEVICE_WORD_OFFSET + 4]
            .copy_from_slice(&0x8000_1234u32.to_be_bytes());
        t.bytes.splice(insert_at..insert_at, entry.iter().copied());

        assert_eq!(t.resolve("OUT").unwrap().raw(), 0x1234);
    }

    #[test]
    fn zero_device_token_is_an_error() {
        let mut t = TaskIoTable::new("J", "", "S");
        t.push_entry("OUT", DeviceToken::new(0)).unwrap();
        let err = t.resolve("OUT").unwrap_err();
        assert!(matches!(err, BpamError::DeviceResolution { .. }));
    }

    #[test]
    fn walk_skips_longer_entries() {
        // entry lengths are self-describing; make the first entry longer
        let mut t = TaskIoTable::new("J", "", "S");
        let insert_at = t.bytes.len() - 4;
        let mut long_entry = vec![0u8; 28];
        long_entry[0] = 28;
        long_entry[DDNAME_OFFSET..DDNAME_OFFSET + 8].copy_from_slice(b"FIRST   ");
        long_entry[DEVICE_WORD_OFFSET..DEVICE_WORD_OFFSET + 4]
            .copy_from_slice(&0x000011u32.to_be_bytes());
        t.bytes.splice(insert_at..insert_at, long_entry.iter().copied());
        t.push_entry("SECOND", DeviceToken::new(0x22)).unwrap();

        assert_eq!(t.resolve("SECOND").unwrap().raw(), 0x22);
    }

    #[test]
    fn malformed_entry_is_reported() {
        let mut bytes = TaskIoTable::new("J", "", "S").bytes;
        let insert_at = bytes.len() - 4;
        // claims a length shorter than the minimum
        bytes.splice(insert_at..insert_at, [8u8, 0, 0, 0, 0, 0, 0, 0]);
        let t = TaskIoTable::from_bytes(bytes);
        let err = t.resolve("ANY").unwrap_err();
        assert!(matches!(err, BpamError::DeviceResolution { .. }));
    }

    #[test]
    fn push_entry_validates_ddname() {
        let mut t = TaskIoTable::new("J", "", "S");
        assert!(t.push_entry("TOOLONGDD", DeviceToken::new(1)).is_err());
        assert!(t.push_entry("", DeviceToken::new(1)).is_err());
    }
}
