//! Fixed-record block assembly.
//!
//! Records are laid into a block buffer at fixed `lrecl` slots; short
//! records are blank-padded to the slot width. A full buffer holds
//! exactly `blksize / lrecl` records, and the caller decides when to
//! flush a partial one.

/// Accumulates fixed-length records into one physical block.
#[derive(Debug)]
pub struct BlockBuffer {
    lrecl: usize,
    capacity_records: usize,
    buf: Vec<u8>,
    records: usize,
}

impl BlockBuffer {
    /// Buffer sized for `blksize / lrecl` records. The caller has already
    /// validated that `blksize` is a non-zero multiple of `lrecl`.
    pub fn new(lrecl: u32, blksize: u32) -> Self {
        let lrecl = lrecl as usize;
        let blksize = blksize as usize;
        Self {
            lrecl,
            capacity_records: blksize / lrecl,
            buf: Vec::with_capacity(blksize),
            records: 0,
        }
    }

    /// Append one record, blank-padding it to the record length. The
    /// record must fit: callers truncate or reject long records before
    /// reaching the buffer.
    pub fn push(&mut self, record: &[u8]) {
        debug_assert!(record.len() <= self.lrecl);
        debug_assert!(!self.is_full());
        self.buf.extend_from_slice(record);
        self.buf
            .resize(self.buf.len() + (self.lrecl - record.len()), b' ');
        self.records += 1;
    }

    /// Whether the buffer holds a full block.
    pub fn is_full(&self) -> bool {
        self.records == self.capacity_records
    }

    /// Whether the buffer holds no records.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Records currently buffered.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Record length each slot is padded to.
    pub fn lrecl(&self) -> usize {
        self.lrecl
    }

    /// Take the buffered block and its record count, leaving the buffer
    /// empty for the next block.
    pub fn take_block(&mut self) -> (Vec<u8>, usize) {
        let records = self.records;
        self.records = 0;
        (std::mem::take(&mut self.buf), records)
    }
}
