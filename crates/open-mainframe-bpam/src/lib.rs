//! Serialized member write for partitioned datasets.
//!
//! One pathway: open a member for output under cross-system and
//! device-level locks, stream fixed-length records out as full blocks,
//! then publish the member by rewriting its directory entry (location
//! token plus a refreshed statistics payload) in a single atomic step.
//! The first failure at any stage aborts the write and unwinds every
//! lock and open state in reverse order, reporting cleanup problems as
//! secondary diagnostics beside the primary error.
//!
//! ```no_run
//! use open_mainframe_bpam::{
//!     DatasetMetadata, GrsManager, LibraryStore, MemberWriter, TaskIoTable,
//! };
//!
//! # fn main() -> open_mainframe_bpam::Result<()> {
//! let store = LibraryStore::new("/var/lib/datasets");
//! store.allocate("SYSUT2", DatasetMetadata {
//!     dsname: "USER.SOURCE".into(),
//!     member: "PGM1".into(),
//!     ..Default::default()
//! });
//!
//! let mut io_table = TaskIoTable::new("MYJOB", "", "STEP1");
//! io_table.push_entry("SYSUT2", open_mainframe_bpam::DeviceToken::new(0x00A3F0))?;
//!
//! let writer = MemberWriter::new(GrsManager::new(), store, io_table, "IBMUSER");
//! let stats = writer.write_member("SYSUT2", &[b"         PGM1     CSECT".as_slice()])?;
//! assert_eq!(stats.version, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod block;
pub mod directory;
pub mod error;
pub mod grs;
pub mod services;
pub mod stats;
pub mod store;
pub mod tiot;
pub mod types;
pub mod writer;

pub use block::BlockBuffer;
pub use directory::{ControlByte, DirectoryEntry};
pub use error::{BpamError, MemberWriteError, Result, ServiceFailure};
pub use grs::{member_resource, volume_resource, GrsManager, GrsResource, GrsScope};
pub use services::{LockService, MediaService};
pub use stats::{compute_stats, MemberStats};
pub use store::LibraryStore;
pub use tiot::TaskIoTable;
pub use types::{DatasetMetadata, DatasetOrg, DeviceToken, RecordFormat};
pub use writer::{MemberWriter, OutputHandle};
