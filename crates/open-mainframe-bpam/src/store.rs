//! Filesystem-backed library store.
//!
//! Lays a partitioned dataset out under a root directory: one directory
//! per dataset holding a packed `DIRECTORY` file (concatenated encoded
//! entries) and a `members/` subdirectory with one data file per member.
//! Logical names are bound to datasets with [`LibraryStore::allocate`],
//! mirroring how a job step binds ddnames before any I/O.
//!
//! The member directory is the publish point: block writes land in the
//! member's data file as they arrive, but the member is only visible
//! once its directory entry is stored. The directory rewrite goes
//! through a temporary file and a rename, so a failed store leaves the
//! directory unchanged.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::debug;

use crate::directory::DirectoryEntry;
use crate::error::ServiceFailure;
use crate::services::MediaService;
use crate::types::DatasetMetadata;

const DIRECTORY_FILE: &str = "DIRECTORY";
const MEMBERS_DIR: &str = "members";

struct OpenMember {
    ddname: String,
    file: File,
}

/// Stores partitioned datasets as directories under a filesystem root.
pub struct LibraryStore {
    root: PathBuf,
    allocations: DashMap<String, DatasetMetadata>,
    open: Mutex<Option<OpenMember>>,
}

impl LibraryStore {
    /// Create a store rooted at `root`. Datasets appear lazily as they
    /// are first opened for output.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allocations: DashMap::new(),
            open: Mutex::new(None),
        }
    }

    /// Bind a logical name to a dataset's attribute snapshot.
    pub fn allocate(&self, ddname: &str, meta: DatasetMetadata) {
        self.allocations
            .insert(ddname.trim().to_uppercase(), meta);
    }

    fn allocation(&self, ddname: &str) -> Result<DatasetMetadata, ServiceFailure> {
        self.allocations
            .get(&ddname.trim().to_uppercase())
            .map(|m| m.value().clone())
            .ok_or_else(|| {
                ServiceFailure::with_msg("ALLOC", 8, 0, format!("ddname {ddname} is not allocated"))
            })
    }

    fn dataset_dir(&self, meta: &DatasetMetadata) -> PathBuf {
        self.root.join(meta.dsname.trim().to_uppercase())
    }

    fn directory_path(&self, meta: &DatasetMetadata) -> PathBuf {
        self.dataset_dir(meta).join(DIRECTORY_FILE)
    }

    fn member_path(&self, meta: &DatasetMetadata, member: &str) -> PathBuf {
        self.dataset_dir(meta)
            .join(MEMBERS_DIR)
            .join(member.trim().to_uppercase())
    }

    fn read_directory(&self, path: &Path) -> Result<Vec<Vec<u8>>, ServiceFailure> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_failure("FIND", e)),
        };

        let mut entries = Vec::new();
        let mut off = 0;
        while off < bytes.len() {
            let len = DirectoryEntry::encoded_len(&bytes[off..]).ok_or_else(|| {
                ServiceFailure::with_msg("FIND", 12, 0, "truncated directory entry")
            })?;
            if off + len > bytes.len() {
                return Err(ServiceFailure::with_msg(
                    "FIND",
                    12,
                    0,
                    "truncated directory entry",
                ));
            }
            entries.push(bytes[off..off + len].to_vec());
            off += len;
        }
        Ok(entries)
    }

    fn write_directory(&self, path: &Path, entries: &[Vec<u8>]) -> Result<(), ServiceFailure> {
        let tmp = path.with_extension("tmp");
        let mut packed = Vec::new();
        for entry in entries {
            packed.extend_from_slice(entry);
        }
        fs::write(&tmp, &packed).map_err(|e| io_failure("STOW", e))?;
        fs::rename(&tmp, path).map_err(|e| io_failure("STOW", e))
    }
}

fn io_failure(service: &str, e: std::io::Error) -> ServiceFailure {
    ServiceFailure::with_msg(service, 8, 0, e.to_string())
}

fn entry_name(entry: &[u8]) -> String {
    String::from_utf8_lossy(&entry[..8]).trim_end().to_string()
}

impl MediaService for LibraryStore {
    fn read_metadata(&self, ddname: &str) -> Result<DatasetMetadata, ServiceFailure> {
        self.allocation(ddname)
    }

    fn open_output(&self, ddname: &str, member: &str) -> Result<(), ServiceFailure> {
        let meta = self.allocation(ddname)?;
        let path = self.member_path(&meta, member);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_failure("OPEN", e))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| io_failure("OPEN", e))?;

        let mut open = self
            .open
            .lock()
            .map_err(|_| ServiceFailure::with_msg("OPEN", 16, 0, "store state poisoned"))?;
        if open.is_some() {
            return Err(ServiceFailure::with_msg(
                "OPEN",
                8,
                0,
                "another member is already open for output",
            ));
        }
        debug!(ddname, member, path = %path.display(), "member open for output");
        *open = Some(OpenMember {
            ddname: ddname.trim().to_uppercase(),
            file,
        });
        Ok(())
    }

    fn write_block(&self, ddname: &str, block: &[u8]) -> Result<(), ServiceFailure> {
        let mut open = self
            .open
            .lock()
            .map_err(|_| ServiceFailure::with_msg("WRITE", 16, 0, "store state poisoned"))?;
        let member = open.as_mut().ok_or_else(|| {
            ServiceFailure::with_msg("WRITE", 8, 0, "no member is open for output")
        })?;
        if member.ddname != ddname.trim().to_uppercase() {
            return Err(ServiceFailure::with_msg(
                "WRITE",
                8,
                0,
                format!("ddname {ddname} does not own the open member"),
            ));
        }
        member.file.write_all(block).map_err(|e| io_failure("WRITE", e))
    }

    fn close(&self, ddname: &str) -> Result<(), ServiceFailure> {
        let mut open = self
            .open
            .lock()
            .map_err(|_| ServiceFailure::with_msg("CLOSE", 16, 0, "store state poisoned"))?;
        let member = open.take().ok_or_else(|| {
            ServiceFailure::with_msg("CLOSE", 8, 0, "no member is open for output")
        })?;
        if member.ddname != ddname.trim().to_uppercase() {
            *open = Some(member);
            return Err(ServiceFailure::with_msg(
                "CLOSE",
                8,
                0,
                format!("ddname {ddname} does not own the open member"),
            ));
        }
        member.file.sync_all().map_err(|e| io_failure("CLOSE", e))
    }

    fn directory_read(
        &self,
        ddname: &str,
        member: &str,
    ) -> Result<Option<Vec<u8>>, ServiceFailure> {
        let meta = self.allocation(ddname)?;
        let want = member.trim().to_uppercase();
        let entries = self.read_directory(&self.directory_path(&meta))?;
        Ok(entries.into_iter().find(|e| entry_name(e) == want))
    }

    fn directory_store(&self, ddname: &str, entry: &[u8]) -> Result<(), ServiceFailure> {
        let meta = self.allocation(ddname)?;
        if DirectoryEntry::encoded_len(entry) != Some(entry.len()) {
            return Err(ServiceFailure::with_msg(
                "STOW",
                12,
                0,
                "malformed directory entry",
            ));
        }
        let name = entry_name(entry);
        let path = self.directory_path(&meta);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_failure("STOW", e))?;
        }

        let mut entries = self.read_directory(&path)?;
        let mut stored = entry.to_vec();

        match entries.iter().position(|e| entry_name(e) == name) {
            Some(i) => {
                // replacing: keep the slot's location token if the new
                // entry carries none
                if stored[8..11] == [0, 0, 0] {
                    stored[8..11].copy_from_slice(&entries[i][8..11]);
                }
                entries[i] = stored;
            }
            None => {
                if stored[8..11] == [0, 0, 0] {
                    let seq = (entries.len() + 1) as u16;
                    stored[8] = 0;
                    stored[9..11].copy_from_slice(&seq.to_be_bytes());
                }
                entries.push(stored);
                // directory order is by member name
                entries.sort_by_key(|e| entry_name(e));
            }
        }

        self.write_directory(&path, &entries)?;
        debug!(ddname, member = %name, "directory entry stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DatasetOrg, RecordFormat};

    fn meta() -> DatasetMetadata {
        DatasetMetadata {
            dsname: "USER.SOURCE".to_string(),
            member: "PGM1".to_string(),
            dsorg: DatasetOrg::Partitioned,
            recfm: RecordFormat::FixedBlocked,
            lrecl: 80,
            blksize: 800,
        }
    }

    fn store() -> (tempfile::TempDir, LibraryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LibraryStore::new(dir.path());
        store.allocate("SYSUT2", meta());
        (dir, store)
    }

    #[test]
    fn unallocated_ddname_is_reported() {
        let (_dir, store) = store();
        let err = store.read_metadata("NODD").unwrap_err();
        assert_eq!(err.service, "ALLOC");
    }

    #[test]
    fn blocks_land_in_the_member_data_file() {
        let (dir, store) = store();
        store.open_output("SYSUT2", "PGM1").unwrap();
        store.write_block("SYSUT2", b"AAAA").unwrap();
        store.write_block("SYSUT2", b"BB").unwrap();
        store.close("SYSUT2").unwrap();

        let data = fs::read(dir.path().join("USER.SOURCE/members/PGM1")).unwrap();
        assert_eq!(&data, b"AAAABB");
    }

    #[test]
    fn directory_store_assigns_and_keeps_location_tokens() {
        let (_dir, store) = store();

        let e = DirectoryEntry::new("PGM1").encode().unwrap();
        store.directory_store("SYSUT2", &e).unwrap();
        let first = DirectoryEntry::decode(
            &store.directory_read("SYSUT2", "PGM1").unwrap().unwrap(),
        )
        .unwrap();
        assert_ne!(first.ttr, [0, 0, 0]);

        // rewrite with a zero token keeps the assigned one
        store.directory_store("SYSUT2", &e).unwrap();
        let second = DirectoryEntry::decode(
            &store.directory_read("SYSUT2", "PGM1").unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(second.ttr, first.ttr);
    }

    #[test]
    fn directory_is_sorted_by_member_name() {
        let (_dir, store) = store();
        for name in ["ZULU", "ALPHA", "MIKE"] {
            let e = DirectoryEntry::new(name).encode().unwrap();
            store.directory_store("SYSUT2", &e).unwrap();
        }

        let path = store.directory_path(&meta());
        let entries = store.read_directory(&path).unwrap();
        let names: Vec<String> = entries.iter().map(|e| entry_name(e)).collect();
        assert_eq!(names, vec!["ALPHA", "MIKE", "ZULU"]);
    }

    #[test]
    fn missing_member_reads_as_none() {
        let (_dir, store) = store();
        assert!(store.directory_read("SYSUT2", "NONE").unwrap().is_none());
    }

    #[test]
    fn second_open_without_close_is_refused() {
        let (_dir, store) = store();
        store.open_output("SYSUT2", "PGM1").unwrap();
        let err = store.open_output("SYSUT2", "PGM2").unwrap_err();
        assert_eq!(err.service, "OPEN");
        store.close("SYSUT2").unwrap();
    }

    #[test]
    fn write_without_open_is_refused() {
        let (_dir, store) = store();
        let err = store.write_block("SYSUT2", b"X").unwrap_err();
        assert_eq!(err.service, "WRITE");
        assert_eq!(err.rc, 8);
    }

    #[test]
    fn reopen_truncates_prior_member_data() {
        let (dir, store) = store();
        store.open_output("SYSUT2", "PGM1").unwrap();
        store.write_block("SYSUT2", b"OLDDATA").unwrap();
        store.close("SYSUT2").unwrap();

        store.open_output("SYSUT2", "PGM1").unwrap();
        store.write_block("SYSUT2", b"NEW").unwrap();
        store.close("SYSUT2").unwrap();

        let data = fs::read(dir.path().join("USER.SOURCE/members/PGM1")).unwrap();
        assert_eq!(&data, b"NEW");
    }
}
