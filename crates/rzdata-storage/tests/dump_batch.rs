#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Integration tests for dump builds, batch import and batch export.

use rzdata_storage::{
    ArchiveConfig, ArchiveEngine, ArchiveError, ArchiveEvent, ErrorKind, EventKind, IndexEntry,
    ShardId, shard_path,
};
use std::path::Path;
use std::sync::mpsc;
use tempfile::{TempDir, tempdir};

fn shard(id: u8) -> ShardId {
    ShardId::new(id).expect("valid shard")
}

fn write(path: &Path, data: &[u8]) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, data).expect("write");
}

fn shard_len(dir: &Path, id: u8) -> u64 {
    std::fs::metadata(shard_path(dir, shard(id)))
        .expect("shard metadata")
        .len()
}

/// Dump with three shard-3 files, one shard-6 file and one unstorable file
fn sample_dump() -> TempDir {
    let dump = tempdir().expect("tempdir");
    let root = dump.path();
    write(&root.join("RDB/db_item.rdb"), &[0x11; 12]);
    write(&root.join("TXT/d.txt"), &[0x22; 18]);
    write(&root.join("DDS/b.dds"), &[0x33; 4]);
    write(&root.join("DDS/a.dds"), &[0x44; 5]);
    write(&root.join("EXE/tool.exe"), &[0x55; 3]);
    dump
}

#[test]
fn build_from_dump_replaces_contents() {
    let dir = tempdir().expect("tempdir");
    let mut engine = ArchiveEngine::create(ArchiveConfig::new(dir.path())).expect("create");
    engine.import("e.lua", b"print(1)").expect("stale entry");

    let dump = sample_dump();
    let report = engine.build_from_dump(dump.path()).expect("build");
    assert_eq!(report.succeeded.len(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(
        report.skipped,
        [("tool.exe".to_string(), "extension not storable".to_string())]
    );

    // Index keeps scan order
    let names: Vec<_> = engine.index().iter().map(IndexEntry::plain_name).collect();
    assert_eq!(names, ["a.dds", "b.dds", "db_item.rdb", "d.txt"]);

    // Shard 3 is filled smallest first
    let layout: Vec<(String, u32, u32)> = engine
        .index()
        .entries_in_shard(shard(3))
        .into_iter()
        .map(|e| (e.plain_name().to_string(), e.offset(), e.length()))
        .collect();
    assert_eq!(
        layout,
        [
            ("b.dds".to_string(), 0, 4),
            ("db_item.rdb".to_string(), 4, 12),
            ("d.txt".to_string(), 16, 18)
        ]
    );
    assert_eq!(shard_len(dir.path(), 3), 34);
    assert_eq!(shard_len(dir.path(), 6), 5);
    assert_eq!(shard_len(dir.path(), 7), 0);
    assert!(engine.entry("e.lua").is_none());

    assert_eq!(engine.read_by_name("d.txt").expect("read"), [0x22; 18]);
    assert_eq!(engine.read_by_name("a.dds").expect("read"), [0x44; 5]);

    let reopened = ArchiveEngine::open(ArchiveConfig::new(dir.path())).expect("open");
    assert_eq!(reopened.index(), engine.index());
}

#[test]
fn build_from_dump_skips_duplicate_names() {
    let dir = tempdir().expect("tempdir");
    let mut engine = ArchiveEngine::create(ArchiveConfig::new(dir.path())).expect("create");

    let dump = tempdir().expect("tempdir");
    write(&dump.path().join("DDS/a.dds"), &[1; 5]);
    write(&dump.path().join("RDB/a.dds"), &[2; 9]);

    let report = engine.build_from_dump(dump.path()).expect("build");
    assert_eq!(report.succeeded, ["a.dds"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(engine.read_by_name("a.dds").expect("read"), [1; 5]);
}

#[test]
fn build_from_dump_reports_overlong_names() {
    let dir = tempdir().expect("tempdir");
    let mut engine = ArchiveEngine::create(ArchiveConfig::new(dir.path())).expect("create");
    engine.import("db_item.rdb", &[1; 12]).expect("import");

    let dump = tempdir().expect("tempdir");
    let long_name = format!("{}.rdb", "a".repeat(250));
    write(&dump.path().join("RDB").join(&long_name), &[7; 3]);
    write(&dump.path().join("RDB/z.rdb"), &[8; 6]);

    let report = engine.build_from_dump(dump.path()).expect("build");
    assert_eq!(report.succeeded, ["z.rdb"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, long_name);
    assert_eq!(report.failed[0].error.kind(), ErrorKind::InvalidArgument);

    let reopened = ArchiveEngine::open(ArchiveConfig::new(dir.path())).expect("open");
    assert_eq!(reopened.index().len(), 1);
    assert_eq!(reopened.read_by_name("z.rdb").expect("read"), [8; 6]);
    assert!(reopened.entry("db_item.rdb").is_none());
}

#[test]
fn build_from_missing_dump_is_fatal() {
    let dir = tempdir().expect("tempdir");
    let mut engine = ArchiveEngine::create(ArchiveConfig::new(dir.path())).expect("create");
    engine.import("db_item.rdb", &[1; 12]).expect("import");

    let err = engine
        .build_from_dump(&dir.path().join("no-such-dump"))
        .expect_err("missing dump");
    assert!(matches!(err, ArchiveError::DumpMissing(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(engine.index().len(), 1);
    assert_eq!(shard_len(dir.path(), 3), 12);
}

#[test]
fn export_all_round_trips_through_dump() {
    let dir = tempdir().expect("tempdir");
    let mut engine = ArchiveEngine::create(ArchiveConfig::new(dir.path())).expect("create");
    let dump = sample_dump();
    engine.build_from_dump(dump.path()).expect("build");
    engine.import("notes.exe", b"MZ").expect("permissive import");

    let out = tempdir().expect("tempdir");
    let report = engine.export_all(out.path()).expect("export");
    assert_eq!(report.succeeded.len(), 4);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "notes.exe");
    assert!(report.is_complete());

    // Grouped by shard, then by offset
    assert_eq!(
        report.succeeded,
        ["b.dds", "db_item.rdb", "d.txt", "a.dds"]
    );

    for name in ["RDB/db_item.rdb", "TXT/d.txt", "DDS/b.dds", "DDS/a.dds"] {
        assert_eq!(
            std::fs::read(out.path().join(name)).expect("exported"),
            std::fs::read(dump.path().join(name)).expect("original"),
            "{name}"
        );
    }
    assert!(!out.path().join("EXE").exists());
}

#[test]
fn export_entries_reports_per_item_failures() {
    let dir = tempdir().expect("tempdir");
    let mut engine = ArchiveEngine::create(ArchiveConfig::new(dir.path())).expect("create");
    engine.import("db_item.rdb", &[1; 12]).expect("import");
    engine.import("a.dds", &[2; 5]).expect("import");
    std::fs::remove_file(shard_path(dir.path(), shard(6))).expect("remove shard");

    let out = tempdir().expect("tempdir");
    let report = engine.export_all(out.path()).expect("export");
    assert_eq!(report.succeeded, ["db_item.rdb"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, "a.dds");
    assert!(matches!(
        report.failed[0].error,
        ArchiveError::ShardMissing(_)
    ));
}

#[test]
fn import_files_skips_and_reports() {
    let dir = tempdir().expect("tempdir");
    let mut engine = ArchiveEngine::create(ArchiveConfig::new(dir.path())).expect("create");

    let inputs = tempdir().expect("tempdir");
    write(&inputs.path().join("db_item.rdb"), &[3; 12]);
    write(&inputs.path().join("a.dds"), &[4; 5]);
    let missing = inputs.path().join("ghost.txt");

    let report = engine
        .import_files([
            inputs.path().join("db_item.rdb"),
            missing.clone(),
            inputs.path().join("a.dds"),
        ])
        .expect("batch");
    assert_eq!(report.succeeded, ["db_item.rdb", "a.dds"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, missing.display().to_string());
    assert_eq!(report.failed[0].error.kind(), ErrorKind::NotFound);
    assert!(!report.is_complete());

    let reopened = ArchiveEngine::open(ArchiveConfig::new(dir.path())).expect("open");
    assert_eq!(reopened.index().len(), 2);
    assert_eq!(reopened.read_by_name("a.dds").expect("read"), [4; 5]);
}

#[test]
fn observer_receives_warnings_and_progress() {
    let dir = tempdir().expect("tempdir");
    let (tx, rx) = mpsc::channel::<ArchiveEvent>();
    let mut engine = ArchiveEngine::create(ArchiveConfig::new(dir.path()))
        .expect("create")
        .with_observer(tx);

    let dump = sample_dump();
    engine.build_from_dump(dump.path()).expect("build");
    drop(engine);

    let events: Vec<ArchiveEvent> = rx.iter().collect();
    assert!(
        events
            .iter()
            .any(|e| e.kind == EventKind::Warning && e.message.contains("tool.exe"))
    );
    let last = events
        .iter()
        .filter_map(|e| e.progress)
        .last()
        .expect("progress events");
    assert_eq!((last.current, last.max), (4, 4));
}
