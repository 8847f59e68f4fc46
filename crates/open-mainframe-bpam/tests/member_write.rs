//! End-to-end member writes through the filesystem store.

use std::fs;
use std::sync::Arc;

use open_mainframe_bpam::{
    member_resource, BpamError, DatasetMetadata, DatasetOrg, DeviceToken, DirectoryEntry,
    GrsManager, LibraryStore, LockService, MediaService, MemberStats, MemberWriter, RecordFormat,
    TaskIoTable,
};

fn meta(member: &str) -> DatasetMetadata {
    DatasetMetadata {
        dsname: "USER.SOURCE".to_string(),
        member: member.to_string(),
        dsorg: DatasetOrg::Partitioned,
        recfm: RecordFormat::FixedBlocked,
        lrecl: 80,
        blksize: 800,
    }
}

fn io_table() -> TaskIoTable {
    let mut t = TaskIoTable::new("TESTJOB", "", "STEP1");
    t.push_entry("SYSUT2", DeviceToken::new(0x00A3F0)).unwrap();
    t
}

fn harness(
    member: &str,
) -> (
    tempfile::TempDir,
    Arc<GrsManager>,
    Arc<LibraryStore>,
    MemberWriter<Arc<GrsManager>, Arc<LibraryStore>>,
) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LibraryStore::new(dir.path()));
    store.allocate("SYSUT2", meta(member));
    let grs = Arc::new(GrsManager::new());
    let writer = MemberWriter::new(Arc::clone(&grs), Arc::clone(&store), io_table(), "IBMUSER");
    (dir, grs, store, writer)
}

#[test]
fn write_publishes_member_and_releases_everything() {
    let (dir, grs, store, writer) = harness("PGM1");

    let records: Vec<Vec<u8>> = (0..12).map(|i| format!("LINE {i:04}").into_bytes()).collect();
    let refs: Vec<&[u8]> = records.iter().map(|r| r.as_slice()).collect();
    let stats = writer.write_member("SYSUT2", &refs).unwrap();

    assert_eq!(stats.version, 1);
    assert_eq!(stats.mod_level, 0);
    assert_eq!(stats.current_lines, 12);
    assert_eq!(stats.owner, "IBMUSER");

    // 12 records of 80 bytes, blank-padded, one full block plus a tail
    let data = fs::read(dir.path().join("USER.SOURCE/members/PGM1")).unwrap();
    assert_eq!(data.len(), 12 * 80);
    assert!(data[..9].starts_with(b"LINE 0000"));
    assert_eq!(data[9], b' ');

    let entry_bytes = store.directory_read("SYSUT2", "PGM1").unwrap().unwrap();
    let entry = DirectoryEntry::decode(&entry_bytes).unwrap();
    assert_eq!(entry.name, "PGM1");
    assert_eq!(MemberStats::decode(&entry.user_data).unwrap(), stats);

    assert_eq!(grs.held_count(), 0);
}

#[test]
fn rewrite_replaces_data_and_advances_the_level() {
    let (dir, _grs, _store, writer) = harness("PGM1");

    let first: &[&[u8]] = &[b"OLD ONE", b"OLD TWO", b"OLD THREE"];
    writer.write_member("SYSUT2", first).unwrap();

    let second: &[&[u8]] = &[b"NEW"];
    let stats = writer.write_member("SYSUT2", second).unwrap();

    assert_eq!(stats.mod_level, 1);
    assert_eq!(stats.current_lines, 1);
    assert_eq!(stats.initial_lines, 3);

    let data = fs::read(dir.path().join("USER.SOURCE/members/PGM1")).unwrap();
    assert_eq!(data.len(), 80);
    assert!(data.starts_with(b"NEW "));
}

#[test]
fn members_accumulate_in_one_dataset_directory() {
    let (_dir, _grs, store, writer) = harness("ZULU");
    let records: &[&[u8]] = &[b"DATA"];
    writer.write_member("SYSUT2", records).unwrap();

    store.allocate("SYSUT2", meta("ALPHA"));
    writer.write_member("SYSUT2", records).unwrap();

    let zulu = store.directory_read("SYSUT2", "ZULU").unwrap().unwrap();
    let alpha = store.directory_read("SYSUT2", "ALPHA").unwrap().unwrap();
    assert_ne!(
        DirectoryEntry::decode(&zulu).unwrap().ttr,
        DirectoryEntry::decode(&alpha).unwrap().ttr
    );
}

#[test]
fn busy_member_lock_is_surfaced_not_waited_on() {
    let (_dir, grs, _store, writer) = harness("PGM1");
    let res = member_resource("USER.SOURCE", "PGM1");
    grs.enq_exclusive(&res).unwrap();

    let records: &[&[u8]] = &[b"X"];
    let err = writer.write_member("SYSUT2", records).unwrap_err();
    assert!(matches!(err.primary, BpamError::LockAcquisition { .. }));
    assert!(err.secondary.is_empty());

    // only the contending hold remains; nothing of ours leaked
    assert_eq!(grs.held_count(), 1);
    grs.deq(&res).unwrap();

    // and with the contention gone the write goes through
    writer.write_member("SYSUT2", records).unwrap();
    assert_eq!(grs.held_count(), 0);
}

#[test]
fn sequential_dataset_is_rejected_before_any_lock() {
    let (dir, grs, store, writer) = harness("PGM1");
    let mut m = meta("PGM1");
    m.dsorg = DatasetOrg::Sequential;
    store.allocate("SYSUT2", m);

    let err = writer.open_output("SYSUT2").unwrap_err();
    assert!(matches!(err.primary, BpamError::DatasetValidation { .. }));
    assert_eq!(grs.held_count(), 0);
    assert!(!dir.path().join("USER.SOURCE").exists());
}

#[test]
fn inconsistent_blocking_is_rejected_before_any_lock() {
    let (dir, grs, store, writer) = harness("PGM1");
    let mut m = meta("PGM1");
    m.blksize = 801;
    store.allocate("SYSUT2", m);

    let err = writer.open_output("SYSUT2").unwrap_err();
    assert!(matches!(err.primary, BpamError::AttributeValidation { .. }));
    assert_eq!(grs.held_count(), 0);
    assert!(!dir.path().join("USER.SOURCE").exists());
}

#[test]
fn empty_member_is_published_with_zero_lines() {
    let (dir, _grs, store, writer) = harness("EMPTY");
    let records: &[&[u8]] = &[];
    let stats = writer.write_member("SYSUT2", records).unwrap();

    assert_eq!(stats.current_lines, 0);
    let data = fs::read(dir.path().join("USER.SOURCE/members/EMPTY")).unwrap();
    assert!(data.is_empty());
    assert!(store.directory_read("SYSUT2", "EMPTY").unwrap().is_some());
}

#[test]
fn several_rewrites_saturate_nothing_prematurely() {
    let (_dir, _grs, _store, writer) = harness("PGM1");
    let records: &[&[u8]] = &[b"L"];

    let mut last = writer.write_member("SYSUT2", records).unwrap();
    for _ in 0..4 {
        last = writer.write_member("SYSUT2", records).unwrap();
    }
    assert_eq!(last.mod_level, 4);
    assert_eq!(last.version, 1);
}
