//! The member write pathway: open, blocked record writes, and the
//! atomic publish on close.
//!
//! Sequencing is strict. Opening validates attributes, then takes the
//! cross-system member lock, resolves the device, takes the device-level
//! reserve, and opens the dataset, in that order, so a device lock is
//! never held without the cross-system lock above it. Closing flushes
//! the partial block, rewrites the directory entry with fresh statistics
//! exactly once, closes the dataset, and releases the locks in reverse
//! order (device first). The first failure anywhere aborts the pathway
//! and unwinds whatever was acquired; failures raised purely while
//! unwinding never displace the primary error.

use chrono::Utc;
use tracing::{debug, warn};

use crate::block::BlockBuffer;
use crate::directory::DirectoryEntry;
use crate::error::{BpamError, MemberWriteError, Result, ServiceFailure};
use crate::grs::{member_resource, volume_resource, GrsResource};
use crate::services::{LockService, MediaService};
use crate::stats::{compute_stats, MemberStats};
use crate::tiot::TaskIoTable;
use crate::types::{DatasetMetadata, DeviceToken};

/// State of one in-progress member write session.
///
/// Tracks exactly what has been acquired so far; the writer unwinds from
/// this record on any failure. The block buffer exists if and only if
/// the dataset is open.
#[derive(Debug)]
pub struct OutputHandle {
    ddname: String,
    meta: DatasetMetadata,
    /// Working block size; narrowed for the final partial block and
    /// restored before the write result is inspected.
    blksize: u32,
    device: Option<DeviceToken>,
    member_lock: Option<GrsResource>,
    device_lock: Option<(GrsResource, DeviceToken)>,
    open: bool,
    block: Option<BlockBuffer>,
    records_written: usize,
}

impl OutputHandle {
    fn new(ddname: &str, meta: DatasetMetadata) -> Self {
        let blksize = meta.blksize;
        Self {
            ddname: ddname.to_string(),
            meta,
            blksize,
            device: None,
            member_lock: None,
            device_lock: None,
            open: false,
            block: None,
            records_written: 0,
        }
    }

    /// Attribute snapshot the session was opened with.
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.meta
    }

    /// Whether the dataset is open for output.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Current working block size.
    pub fn block_size(&self) -> u32 {
        self.blksize
    }

    /// Records accepted so far, buffered or written.
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Device token the session is bound to, once resolved.
    pub fn device(&self) -> Option<DeviceToken> {
        self.device
    }

    fn full_name(&self) -> String {
        self.meta.full_name()
    }
}

/// Drives the serialized write-and-publish pathway for dataset members.
pub struct MemberWriter<L, M> {
    locks: L,
    media: M,
    io_table: TaskIoTable,
    owner: String,
}

impl<L: LockService, M: MediaService> MemberWriter<L, M> {
    /// Create a writer bound to a lock service, a media service, and the
    /// task's I/O table. `owner` stamps the statistics payload.
    pub fn new(locks: L, media: M, io_table: TaskIoTable, owner: &str) -> Self {
        Self {
            locks,
            media,
            io_table,
            owner: owner.to_string(),
        }
    }

    /// Open a member write session for the dataset allocated at `ddname`.
    ///
    /// Validates the attribute snapshot before any lock is attempted,
    /// then acquires the cross-system member lock, resolves the device,
    /// takes the device-level reserve, and opens the dataset for output.
    /// Any failure releases everything acquired so far.
    pub fn open_output(&self, ddname: &str) -> Result<OutputHandle> {
        let meta = self
            .media
            .read_metadata(ddname)
            .map_err(|failure| BpamError::DatasetValidation {
                name: ddname.to_string(),
                reason: failure.to_string(),
            })?;
        let mut handle = OutputHandle::new(ddname, meta);

        handle.meta.validate_for_member_write()?;
        handle.meta.validate_blocking()?;

        let member_lock = member_resource(&handle.meta.dsname, &handle.meta.member);
        if let Err(failure) = self.locks.enq_exclusive(&member_lock) {
            return Err(BpamError::LockAcquisition {
                qname: member_lock.qname.clone(),
                rname: member_lock.rname.clone(),
                failure,
            }
            .into());
        }
        handle.member_lock = Some(member_lock);

        let device = match self.io_table.resolve(ddname) {
            Ok(device) => device,
            Err(err) => return Err(self.unwind(&mut handle, err)),
        };
        handle.device = Some(device);

        let volume_lock = volume_resource(&handle.meta.dsname);
        if let Err(failure) = self.locks.reserve(&volume_lock, device) {
            let err = BpamError::LockAcquisition {
                qname: volume_lock.qname.clone(),
                rname: volume_lock.rname.clone(),
                failure,
            };
            return Err(self.unwind(&mut handle, err));
        }
        handle.device_lock = Some((volume_lock, device));

        if let Err(failure) = self.media.open_output(ddname, handle.meta.member.trim()) {
            let err = BpamError::Open {
                name: handle.full_name(),
                failure,
            };
            return Err(self.unwind(&mut handle, err));
        }
        handle.open = true;
        handle.block = Some(BlockBuffer::new(handle.meta.lrecl, handle.meta.blksize));
        debug!(name = %handle.full_name(), device = %device, "member output open");

        Ok(handle)
    }

    /// Append one logical record to the member.
    ///
    /// Records longer than the record length are truncated with a
    /// warning; short records are blank-padded. A full block is written
    /// through to the media service immediately.
    pub fn write_record(&self, handle: &mut OutputHandle, record: &[u8]) -> Result<()> {
        if !handle.open {
            return Err(BpamError::Write {
                name: handle.full_name(),
                failure: ServiceFailure::with_msg("BPAM", 8, 0, "output handle is closed"),
            }
            .into());
        }

        let lrecl = handle.meta.lrecl as usize;
        let record = if record.len() > lrecl {
            warn!(
                name = %handle.full_name(),
                len = record.len(),
                lrecl,
                "record truncated to the record length"
            );
            &record[..lrecl]
        } else {
            record
        };

        let block = handle.block.as_mut().expect("buffer exists while open");
        block.push(record);
        handle.records_written += 1;

        if block.is_full() {
            let (bytes, _) = block.take_block();
            if let Err(failure) = self.media.write_block(&handle.ddname, &bytes) {
                let err = BpamError::Write {
                    name: handle.full_name(),
                    failure,
                };
                return Err(self.unwind(handle, err));
            }
        }
        Ok(())
    }

    /// Flush, publish, and release.
    ///
    /// Writes the final partial block (narrowing the working block size
    /// for its duration), computes the next statistics payload from the
    /// prior directory entry, rewrites the directory entry exactly once,
    /// closes the dataset, and releases the device lock then the member
    /// lock. Returns the statistics that were published.
    pub fn close_output(&self, handle: &mut OutputHandle) -> Result<MemberStats> {
        if !handle.open {
            return Err(BpamError::Close {
                name: handle.full_name(),
                failure: ServiceFailure::with_msg("BPAM", 8, 0, "output handle is closed"),
            }
            .into());
        }

        // Final partial block. The working block size is narrowed to the
        // partial length and restored before the result is inspected.
        let block = handle.block.as_mut().expect("buffer exists while open");
        if !block.is_empty() {
            let (bytes, _) = block.take_block();
            handle.blksize = bytes.len() as u32;
            let written = self.media.write_block(&handle.ddname, &bytes);
            handle.blksize = handle.meta.blksize;
            if let Err(failure) = written {
                let err = BpamError::Write {
                    name: handle.full_name(),
                    failure,
                };
                return Err(self.unwind(handle, err));
            }
        }

        // Prior entry, if any, supplies the location token and the
        // statistics the update rule starts from.
        let prior_bytes = match self.media.directory_read(&handle.ddname, handle.meta.member.trim())
        {
            Ok(bytes) => bytes,
            Err(failure) => {
                let err = BpamError::directory_lookup(handle.full_name(), failure);
                return Err(self.unwind(handle, err));
            }
        };
        let prior_entry = match prior_bytes {
            Some(bytes) => match DirectoryEntry::decode(&bytes) {
                Ok(entry) => Some(entry),
                Err(err) => return Err(self.unwind(handle, err)),
            },
            None => None,
        };
        let prior_stats = prior_entry
            .as_ref()
            .filter(|e| e.has_user_data())
            .and_then(|e| MemberStats::decode(&e.user_data));

        let stats = compute_stats(
            prior_stats.as_ref(),
            handle.records_written,
            &self.owner,
            Utc::now(),
        );

        let mut entry = match prior_entry {
            Some(prior) => prior,
            None => DirectoryEntry::new(handle.meta.member.trim()),
        };
        entry.user_data = stats.encode().to_vec();

        let encoded = match entry.encode() {
            Ok(encoded) => encoded,
            Err(err) => return Err(self.unwind(handle, err)),
        };
        if let Err(failure) = self.media.directory_store(&handle.ddname, &encoded) {
            let err = BpamError::directory_update(handle.full_name(), failure);
            return Err(self.unwind(handle, err));
        }
        debug!(name = %handle.full_name(), level = stats.mod_level, "directory entry published");

        handle.block = None;
        handle.open = false;
        if let Err(failure) = self.media.close(&handle.ddname) {
            let err = BpamError::Close {
                name: handle.full_name(),
                failure,
            };
            return Err(self.unwind(handle, err));
        }

        // Success path: device lock first, then the cross-system lock.
        // The first release failure becomes the primary error; the
        // remaining release is still attempted.
        let mut primary: Option<BpamError> = None;
        let mut secondary = Vec::new();
        if let Some((resource, device)) = handle.device_lock.take() {
            if let Err(failure) = self.locks.release(&resource, device) {
                primary = Some(BpamError::Close {
                    name: handle.full_name(),
                    failure,
                });
            }
        }
        if let Some(resource) = handle.member_lock.take() {
            if let Err(failure) = self.locks.deq(&resource) {
                let err = BpamError::Close {
                    name: handle.full_name(),
                    failure,
                };
                if primary.is_some() {
                    secondary.push(err);
                } else {
                    primary = Some(err);
                }
            }
        }
        if let Some(primary) = primary {
            return Err(MemberWriteError { primary, secondary });
        }

        Ok(stats)
    }

    /// Write a whole member in one call: open, append every record,
    /// close. Returns the published statistics.
    pub fn write_member(&self, ddname: &str, records: &[&[u8]]) -> Result<MemberStats> {
        let mut handle = self.open_output(ddname)?;
        for record in records {
            self.write_record(&mut handle, record)?;
        }
        self.close_output(&mut handle)
    }

    /// Release everything the handle holds, in reverse acquisition
    /// order, after a failure. Cleanup failures are collected as
    /// secondary diagnostics; `primary` is never replaced.
    fn unwind(&self, handle: &mut OutputHandle, primary: BpamError) -> MemberWriteError {
        let mut err = MemberWriteError::from(primary);

        if handle.open {
            handle.open = false;
            handle.block = None;
            if let Err(failure) = self.media.close(&handle.ddname) {
                warn!(name = %handle.full_name(), %failure, "close failed during unwind");
                err.secondary.push(BpamError::Close {
                    name: handle.full_name(),
                    failure,
                });
            }
        }
        if let Some((resource, device)) = handle.device_lock.take() {
            if let Err(failure) = self.locks.release(&resource, device) {
                warn!(name = %handle.full_name(), %failure, "device release failed during unwind");
                err.secondary.push(BpamError::Close {
                    name: handle.full_name(),
                    failure,
                });
            }
        }
        if let Some(resource) = handle.member_lock.take() {
            if let Err(failure) = self.locks.deq(&resource) {
                warn!(name = %handle.full_name(), %failure, "lock release failed during unwind");
                err.secondary.push(BpamError::Close {
                    name: handle.full_name(),
                    failure,
                });
            }
        }

        err
    }
}
