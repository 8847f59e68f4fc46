//! Dataset attribute types and validation.
//!
//! The metadata snapshot is read once per session from the media service
//! and never mutated afterwards; all attribute checks live here so the
//! pathway validates in one place before touching any lock or device.

use serde::{Deserialize, Serialize};

use crate::error::BpamError;

/// Record format (RECFM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordFormat {
    /// Fixed-length records.
    Fixed,
    /// Fixed-length blocked records.
    #[default]
    FixedBlocked,
    /// Variable-length records.
    Variable,
    /// Variable-length blocked records.
    VariableBlocked,
    /// Undefined-length records.
    Undefined,
}

impl RecordFormat {
    /// Parse a record format from its conventional abbreviation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "F" => Some(RecordFormat::Fixed),
            "FB" => Some(RecordFormat::FixedBlocked),
            "V" => Some(RecordFormat::Variable),
            "VB" => Some(RecordFormat::VariableBlocked),
            "U" => Some(RecordFormat::Undefined),
            _ => None,
        }
    }

    /// Whether records are fixed-length.
    pub fn is_fixed(&self) -> bool {
        matches!(self, RecordFormat::Fixed | RecordFormat::FixedBlocked)
    }
}

/// Dataset organization (DSORG).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DatasetOrg {
    /// Physical sequential.
    #[default]
    Sequential,
    /// Partitioned (a member directory plus member data).
    Partitioned,
    /// Direct access.
    Direct,
}

impl DatasetOrg {
    /// Parse an organization from its conventional abbreviation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PS" => Some(DatasetOrg::Sequential),
            "PO" => Some(DatasetOrg::Partitioned),
            "DA" => Some(DatasetOrg::Direct),
            _ => None,
        }
    }
}

/// Low 24 bits of a unit control block address: identifies the device
/// backing a dataset for the lifetime of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceToken(u32);

impl DeviceToken {
    /// Build a token, masking to the low 24 bits.
    pub fn new(raw: u32) -> Self {
        Self(raw & 0x00FF_FFFF)
    }

    /// The raw 24-bit value.
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// A zero token never identifies a real device.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

/// Read-only dataset attribute snapshot for one member-write session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Dataset name (1-44 characters).
    pub dsname: String,
    /// Member name bound at allocation time; blank means none.
    pub member: String,
    /// Dataset organization.
    pub dsorg: DatasetOrg,
    /// Record format.
    pub recfm: RecordFormat,
    /// Logical record length.
    pub lrecl: u32,
    /// Block size.
    pub blksize: u32,
}

impl DatasetMetadata {
    /// Full `DSNAME(MEMBER)` name for messages.
    pub fn full_name(&self) -> String {
        if self.member.trim().is_empty() {
            self.dsname.clone()
        } else {
            format!("{}({})", self.dsname, self.member.trim())
        }
    }

    /// Records that fit in one full block.
    pub fn records_per_block(&self) -> u32 {
        if self.lrecl == 0 {
            0
        } else {
            self.blksize / self.lrecl
        }
    }

    /// Validate that this dataset can take a member write: partitioned
    /// organization, a non-blank member name, and a fixed record format.
    pub fn validate_for_member_write(&self) -> Result<(), BpamError> {
        if self.dsorg != DatasetOrg::Partitioned {
            return Err(BpamError::DatasetValidation {
                name: self.full_name(),
                reason: format!("organization {:?} is not partitioned", self.dsorg),
            });
        }
        if self.member.trim().is_empty() {
            return Err(BpamError::DatasetValidation {
                name: self.dsname.clone(),
                reason: "no member name in the allocation".to_string(),
            });
        }
        if !self.recfm.is_fixed() {
            return Err(BpamError::DatasetValidation {
                name: self.full_name(),
                reason: format!("record format {:?} is not fixed", self.recfm),
            });
        }
        Ok(())
    }

    /// Validate the blocking attributes: block size must be a positive
    /// exact multiple of the record length. Checked before any lock is
    /// attempted and before any buffer is allocated.
    pub fn validate_blocking(&self) -> Result<(), BpamError> {
        if self.lrecl == 0 {
            return Err(BpamError::AttributeValidation {
                name: self.full_name(),
                reason: "LRECL must be greater than 0".to_string(),
            });
        }
        if self.blksize == 0 || self.blksize % self.lrecl != 0 {
            return Err(BpamError::AttributeValidation {
                name: self.full_name(),
                reason: format!(
                    "BLKSIZE {} is not a positive multiple of LRECL {}",
                    self.blksize, self.lrecl
                ),
            });
        }
        Ok(())
    }
}

impl Default for DatasetMetadata {
    fn default() -> Self {
        Self {
            dsname: String::new(),
            member: String::new(),
            dsorg: DatasetOrg::Partitioned,
            recfm: RecordFormat::FixedBlocked,
            lrecl: 80,
            blksize: 800,
        }
    }
}
