//! Member directory entry wire codec.
//!
//! On-media form, big-endian throughout:
//!
//! ```text
//! +0   name       8 bytes, blank-padded
//! +8   ttr        3 bytes, location token
//! +11  concat     1 byte, concatenation value
//! +12  control    1 byte: bit 0 (MSB) alias flag,
//!                 bits 1-2 location-token count,
//!                 bits 3-7 user-data length in halfwords
//! +13  user data  up to 62 bytes (even length)
//! ```
//!
//! The packed control byte is its own value type so the bit layout lives
//! in exactly one place.

use crate::error::BpamError;

/// Maximum user data carried by one entry.
pub const MAX_USER_DATA_LEN: usize = 62;
/// Fixed bytes ahead of the user data.
pub const ENTRY_HEADER_LEN: usize = 13;

/// Unpacked form of the directory entry control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlByte {
    /// Entry names an alias rather than the member itself.
    pub alias: bool,
    /// Number of embedded location tokens in the user data (0-3).
    pub ttrn_count: u8,
    /// User data length in halfwords (0-31).
    pub user_halfwords: u8,
}

impl ControlByte {
    /// Pack into the wire byte. Out-of-range counts are masked.
    pub fn pack(self) -> u8 {
        let alias = if self.alias { 0x80 } else { 0 };
        alias | ((self.ttrn_count & 0x03) << 5) | (self.user_halfwords & 0x1F)
    }

    /// Unpack from the wire byte.
    pub fn unpack(byte: u8) -> Self {
        Self {
            alias: byte & 0x80 != 0,
            ttrn_count: (byte >> 5) & 0x03,
            user_halfwords: byte & 0x1F,
        }
    }
}

/// One member's directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Member name (1-8 characters, stored uppercase).
    pub name: String,
    /// Location token; assigned by the media service on store.
    pub ttr: [u8; 3],
    /// Concatenation value.
    pub concat: u8,
    /// Alias flag.
    pub alias: bool,
    /// Embedded location-token count.
    pub ttrn_count: u8,
    /// Statistics payload or other user data (even length, ≤ 62 bytes).
    pub user_data: Vec<u8>,
}

impl DirectoryEntry {
    /// Fresh entry for a member with no location and no user data.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_uppercase(),
            ttr: [0; 3],
            concat: 0,
            alias: false,
            ttrn_count: 0,
            user_data: Vec::new(),
        }
    }

    /// The control byte this entry encodes to.
    pub fn control_byte(&self) -> ControlByte {
        ControlByte {
            alias: self.alias,
            ttrn_count: self.ttrn_count,
            user_halfwords: (self.user_data.len() / 2) as u8,
        }
    }

    /// Whether the entry carries any user data.
    pub fn has_user_data(&self) -> bool {
        !self.user_data.is_empty()
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> Result<Vec<u8>, BpamError> {
        let name = self.name.trim();
        if name.is_empty() || name.len() > 8 {
            return Err(BpamError::DirectoryUpdate {
                name: self.name.clone(),
                reason: "member name must be 1-8 characters".to_string(),
            });
        }
        if self.user_data.len() > MAX_USER_DATA_LEN {
            return Err(BpamError::DirectoryUpdate {
                name: self.name.clone(),
                reason: format!(
                    "user data is {} bytes, maximum is {MAX_USER_DATA_LEN}",
                    self.user_data.len()
                ),
            });
        }
        if self.user_data.len() % 2 != 0 {
            return Err(BpamError::DirectoryUpdate {
                name: self.name.clone(),
                reason: "user data length must be even".to_string(),
            });
        }

        let mut out = Vec::with_capacity(ENTRY_HEADER_LEN + self.user_data.len());
        let mut padded = [b' '; 8];
        for (i, b) in name.to_uppercase().bytes().enumerate() {
            padded[i] = b;
        }
        out.extend_from_slice(&padded);
        out.extend_from_slice(&self.ttr);
        out.push(self.concat);
        out.push(self.control_byte().pack());
        out.extend_from_slice(&self.user_data);
        Ok(out)
    }

    /// Decode from the wire form. The user data length comes from the
    /// control byte; trailing bytes beyond it are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, BpamError> {
        if bytes.len() < ENTRY_HEADER_LEN {
            return Err(BpamError::DirectoryLookup {
                name: "?".to_string(),
                reason: format!("entry is {} bytes, header needs {ENTRY_HEADER_LEN}", bytes.len()),
            });
        }

        let name = String::from_utf8_lossy(&bytes[0..8]).trim_end().to_string();
        let control = ControlByte::unpack(bytes[12]);
        let data_len = control.user_halfwords as usize * 2;
        if bytes.len() < ENTRY_HEADER_LEN + data_len {
            return Err(BpamError::DirectoryLookup {
                name,
                reason: format!(
                    "control byte promises {data_len} bytes of user data, {} available",
                    bytes.len() - ENTRY_HEADER_LEN
                ),
            });
        }

        Ok(Self {
            name,
            ttr: [bytes[8], bytes[9], bytes[10]],
            concat: bytes[11],
            alias: control.alias,
            ttrn_count: control.ttrn_count,
            user_data: bytes[ENTRY_HEADER_LEN..ENTRY_HEADER_LEN + data_len].to_vec(),
        })
    }

    /// Total encoded length of the entry starting at `bytes`, derived
    /// from its control byte. Used to walk a packed directory.
    pub fn encoded_len(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < ENTRY_HEADER_LEN {
            return None;
        }
        let control = ControlByte::unpack(bytes[12]);
        Some(ENTRY_HEADER_LEN + control.user_halfwords as usize * 2)
    }
}
