//! End-to-end synchronizer scenarios against a real directory tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cus_region_sync::logger::activity::ActivityLoggerHandle;
use cus_region_sync::store::RegionCode;
use cus_region_sync::sync::{SyncController, SyncOptions};
use filetime::FileTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn start(root: &Path) -> SyncController {
    let mut options = SyncOptions::for_root(root);
    options.poll_interval = Duration::from_millis(20);
    SyncController::start(options, ActivityLoggerHandle::detached()).unwrap()
}

fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

fn region_of(controller: &SyncController, key: &str) -> Option<RegionCode> {
    controller.with_store(|store| store.region_of(Path::new(key)))
}

fn bump_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(1_900_000_000 + secs, 0)).unwrap();
}

#[test]
fn external_changes_reach_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.cus"), b"HEADER..KOR-alpha").unwrap();
    let controller = start(root);
    assert_eq!(region_of(&controller, "a.cus"), Some(RegionCode::KOR));

    // Add.
    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub/b.cus"), b"HEADER..RUS-beta").unwrap();
    assert!(wait_until(|| region_of(&controller, "sub/b.cus") == Some(RegionCode::RUS)));

    // Modify.
    fs::write(root.join("a.cus"), b"HEADER..USA-alpha").unwrap();
    bump_mtime(&root.join("a.cus"), 1);
    assert!(wait_until(|| region_of(&controller, "a.cus") == Some(RegionCode::USA)));

    // Rename.
    fs::rename(root.join("sub/b.cus"), root.join("sub/c.cus")).unwrap();
    assert!(wait_until(|| {
        region_of(&controller, "sub/b.cus").is_none()
            && region_of(&controller, "sub/c.cus") == Some(RegionCode::RUS)
    }));

    // Delete.
    fs::remove_file(root.join("a.cus")).unwrap();
    assert!(wait_until(|| region_of(&controller, "a.cus").is_none()));
    assert_eq!(controller.with_store(|store| store.len()), 1);
}

#[test]
fn truncated_record_leaves_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.cus");
    fs::write(&path, b"HEADER..KOR-alpha").unwrap();
    let controller = start(dir.path());

    fs::write(&path, b"HEADER").unwrap();
    bump_mtime(&path, 2);
    assert!(wait_until(|| region_of(&controller, "a.cus").is_none()));
    assert!(controller.unconverted_view().is_empty());
}

#[test]
fn own_writes_are_suppressed_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.cus");
    fs::write(&path, b"HEADER..KOR-alpha").unwrap();
    let controller = start(dir.path());

    let report = controller.convert_now().unwrap();
    assert_eq!(report.converted, 1);
    assert_eq!(controller.pending_suppressions(), 1);

    // The echo of our write is consumed without scheduling UI work.
    assert!(wait_until(|| controller.pending_suppressions() == 0));
    assert!(
        controller
            .ui_tasks()
            .recv_timeout(Duration::from_millis(200))
            .is_err()
    );
    assert_eq!(region_of(&controller, "a.cus"), Some(RegionCode::USA));

    // A later external edit of the same file is applied normally.
    fs::write(&path, b"HEADER..RUS-alpha").unwrap();
    bump_mtime(&path, 3);
    let task = controller.ui_tasks().recv_timeout(Duration::from_secs(5));
    assert!(task.is_ok());
    assert_eq!(region_of(&controller, "a.cus"), Some(RegionCode::RUS));
}

#[test]
fn worker_batch_triggers_automatic_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let controller = start(dir.path());
    controller.select_region("KOR").unwrap();
    controller.set_automatic_conversion(true).unwrap();

    fs::write(dir.path().join("new.cus"), b"HEADER..USA-new").unwrap();
    let update = loop {
        match controller.pump_ui(Duration::from_secs(5)) {
            Some(update) => break update.unwrap(),
            None => panic!("worker never reported the new file"),
        }
    };

    assert_eq!(update.conversion.unwrap().converted, 1);
    assert!(update.unconverted.is_empty());
    assert_eq!(&fs::read(dir.path().join("new.cus")).unwrap()[8..11], b"KOR");
}

#[test]
fn concurrent_manual_and_automatic_conversion_do_not_double_apply() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..16 {
        fs::write(dir.path().join(format!("f{i:02}.cus")), b"HEADER..KOR-data").unwrap();
    }
    let controller = Arc::new(start(dir.path()));

    let manual = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || controller.convert_now().unwrap().converted)
    };
    let automatic = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || {
            controller
                .set_automatic_conversion(true)
                .unwrap()
                .conversion
                .map_or(0, |report| report.converted)
        })
    };

    let total = manual.join().unwrap() + automatic.join().unwrap();
    assert_eq!(total, 16);
    assert!(controller.unconverted_view().is_empty());
    for i in 0..16 {
        let bytes = fs::read(dir.path().join(format!("f{i:02}.cus"))).unwrap();
        assert_eq!(&bytes[8..11], b"USA");
    }

    // Converting an already-converted tree is a no-op.
    assert_eq!(controller.convert_now().unwrap().converted, 0);
}

#[test]
fn rescan_request_rebuilds_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.cus"), b"HEADER..KOR-alpha").unwrap();
    let controller = start(dir.path());

    controller.request_rescan();
    let update = controller.pump_ui(Duration::from_secs(5));
    assert!(update.is_some());
    assert_eq!(region_of(&controller, "a.cus"), Some(RegionCode::KOR));
    assert_eq!(controller.with_store(|store| store.len()), 1);
}

/// Region of every valid record currently on disk, keyed like the index.
fn disk_state(root: &Path) -> BTreeMap<PathBuf, RegionCode> {
    let mut state = BTreeMap::new();
    for entry in fs::read_dir(root).unwrap() {
        let path = entry.unwrap().path();
        let bytes = fs::read(&path).unwrap();
        if let Some(code) = RegionCode::read_from(&bytes) {
            state.insert(path.strip_prefix(root).unwrap().to_path_buf(), code);
        }
    }
    state
}

fn index_state(controller: &SyncController) -> BTreeMap<PathBuf, RegionCode> {
    controller.with_store(|store| {
        store
            .all_records()
            .map(|record| (record.key().to_path_buf(), record.region))
            .collect()
    })
}

#[test]
fn random_churn_converges_to_disk_state() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let codes = [b"USA", b"KOR", b"RUS"];
    let controller = start(root);
    let mut rng = StdRng::seed_from_u64(0x00c0_ffee);

    for step in 0..60_i64 {
        let name = root.join(format!("r{}.cus", rng.random_range(0..8)));
        match rng.random_range(0..4) {
            0 | 1 => {
                let mut bytes = b"HEADER..XXX-payload".to_vec();
                bytes[8..11].copy_from_slice(codes[rng.random_range(0..codes.len())]);
                fs::write(&name, &bytes).unwrap();
                bump_mtime(&name, 100 + step);
            }
            2 => {
                let _ = fs::remove_file(&name);
            }
            _ => {
                let target = root.join(format!("r{}.cus", rng.random_range(0..8)));
                let _ = fs::rename(&name, &target);
            }
        }
        if rng.random_range(0..3) == 0 {
            thread::sleep(Duration::from_millis(25));
        }
    }

    let expected = disk_state(root);
    assert!(
        wait_until(|| index_state(&controller) == expected),
        "index {:?} never matched disk {expected:?}",
        index_state(&controller)
    );
}
