//! Error types for the member write pathway.

use miette::Diagnostic;
use thiserror::Error;

/// Failure reported by a consumed external service.
///
/// Carries the service name together with its return and reason codes,
/// plus an optional message when the service supplies one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFailure {
    /// Name of the failing service (e.g. "ENQ", "OPEN", "STOW").
    pub service: String,
    /// Service return code.
    pub rc: i32,
    /// Service reason code.
    pub rsn: u32,
    /// Service-supplied message, possibly empty.
    pub msg: String,
}

impl ServiceFailure {
    /// Create a failure from a service name and its codes.
    pub fn new(service: impl Into<String>, rc: i32, rsn: u32) -> Self {
        Self {
            service: service.into(),
            rc,
            rsn,
            msg: String::new(),
        }
    }

    /// Create a failure with an accompanying message.
    pub fn with_msg(service: impl Into<String>, rc: i32, rsn: u32, msg: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            rc,
            rsn,
            msg: msg.into(),
        }
    }
}

impl std::fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} rc={} rsn={:#06x}", self.service, self.rc, self.rsn)?;
        if !self.msg.is_empty() {
            write!(f, ": {}", self.msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceFailure {}

/// Errors raised by the member write pathway (closed set).
///
/// Variants wrapping an external service call carry the originating
/// [`ServiceFailure`] as their source; validation variants carry a reason.
/// Every message embeds the dataset/member or logical name for traceability.
#[derive(Debug, Error, Diagnostic)]
pub enum BpamError {
    /// Dataset attribute snapshot failed validation (or could not be read).
    #[error("dataset validation failed for {name}: {reason}")]
    #[diagnostic(
        code(bpam::dataset_validation),
        help("The dataset must be partitioned, allocated with a member name, and carry a fixed record format")
    )]
    DatasetValidation {
        /// Dataset or logical name.
        name: String,
        /// What was violated.
        reason: String,
    },

    /// No device could be resolved for the logical name.
    #[error("device resolution failed for ddname {ddname}: {reason}")]
    #[diagnostic(
        code(bpam::device_resolution),
        help("Check that the ddname is allocated in the task I/O table")
    )]
    DeviceResolution {
        /// Logical (DD) name that failed to resolve.
        ddname: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A serialization lock could not be acquired.
    #[error("lock acquisition failed for {qname}/{rname}")]
    #[diagnostic(code(bpam::lock_acquisition))]
    LockAcquisition {
        /// Lock class (queue name).
        qname: String,
        /// Resource name.
        rname: String,
        /// The lock service failure.
        #[source]
        failure: ServiceFailure,
    },

    /// The dataset could not be opened for output.
    #[error("open failed for {name}")]
    #[diagnostic(code(bpam::open))]
    Open {
        /// Full dataset(member) name.
        name: String,
        #[source]
        failure: ServiceFailure,
    },

    /// Record length / block size attributes are inconsistent.
    #[error("attribute validation failed for {name}: {reason}")]
    #[diagnostic(
        code(bpam::attribute_validation),
        help("Block size must be a positive exact multiple of the record length")
    )]
    AttributeValidation {
        /// Dataset or logical name.
        name: String,
        /// What was violated.
        reason: String,
    },

    /// A physical block write failed.
    #[error("block write failed for {name}")]
    #[diagnostic(code(bpam::write))]
    Write {
        /// Full dataset(member) name.
        name: String,
        #[source]
        failure: ServiceFailure,
    },

    /// The directory could not be searched, or an entry could not be decoded.
    #[error("directory lookup failed for {name}: {reason}")]
    #[diagnostic(code(bpam::directory_lookup))]
    DirectoryLookup {
        /// Full dataset(member) name.
        name: String,
        /// Service failure or decode problem.
        reason: String,
    },

    /// The directory rewrite was rejected.
    #[error("directory update failed for {name}: {reason}")]
    #[diagnostic(code(bpam::directory_update))]
    DirectoryUpdate {
        /// Full dataset(member) name.
        name: String,
        /// Service failure or encode problem.
        reason: String,
    },

    /// Closing the dataset (or releasing a lock on the way out) failed.
    #[error("close failed for {name}")]
    #[diagnostic(code(bpam::close))]
    Close {
        /// Full dataset(member) name.
        name: String,
        #[source]
        failure: ServiceFailure,
    },
}

impl BpamError {
    /// Directory lookup failure from an external service.
    pub fn directory_lookup(name: impl Into<String>, failure: ServiceFailure) -> Self {
        BpamError::DirectoryLookup {
            name: name.into(),
            reason: failure.to_string(),
        }
    }

    /// Directory update failure from an external service.
    pub fn directory_update(name: impl Into<String>, failure: ServiceFailure) -> Self {
        BpamError::DirectoryUpdate {
            name: name.into(),
            reason: failure.to_string(),
        }
    }
}

/// Structured failure returned by the member write pathway.
///
/// `primary` is the first failure encountered; `secondary` collects any
/// diagnostics raised purely while unwinding (close or lock release on a
/// failure path). The primary is never replaced by a cleanup failure.
#[derive(Debug, Error, Diagnostic)]
#[error("{primary}")]
#[diagnostic(code(bpam::member_write))]
pub struct MemberWriteError {
    /// The failure that aborted the pathway.
    pub primary: BpamError,
    /// Failures observed during unwind, in the order they occurred.
    #[related]
    pub secondary: Vec<BpamError>,
}

impl From<BpamError> for MemberWriteError {
    fn from(primary: BpamError) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
        }
    }
}

/// Result alias for the caller-facing pathway surface.
pub type Result<T> = std::result::Result<T, MemberWriteError>;
