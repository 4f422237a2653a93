use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use panel_restore::{
    ArchiveKind, ArchiveTier, BackupArchive, ProgressSink, RestoreError, RestorePhase,
    RestoreSession, ServerControl, plan,
};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("panel-restore-flow-{prefix}-{nanos}"))
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("create zip");
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, bytes) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(bytes).expect("write zip entry");
    }
    zip.finish().expect("finish zip");
}

fn archive_at(path: &Path) -> BackupArchive {
    let name = path
        .file_name()
        .expect("archive file name")
        .to_string_lossy()
        .into_owned();
    BackupArchive {
        kind: ArchiveKind::classify(&name),
        name,
        path: path.to_path_buf(),
        tier: ArchiveTier::Differential,
        size_bytes: 0,
        modified_at_ms: 0,
    }
}

struct FakeControl {
    running: AtomicBool,
    stops_on_request: bool,
}

impl FakeControl {
    fn running() -> Self {
        Self {
            running: AtomicBool::new(true),
            stops_on_request: true,
        }
    }

    fn stuck() -> Self {
        Self {
            running: AtomicBool::new(true),
            stops_on_request: false,
        }
    }

    fn stopped() -> Self {
        Self {
            running: AtomicBool::new(false),
            stops_on_request: true,
        }
    }
}

#[async_trait]
impl ServerControl for FakeControl {
    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn request_stop(&self) {
        if self.stops_on_request {
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SinkEvent {
    Progress(u8, String),
    Completed,
    Error(String),
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit_progress(&self, percent: u8, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Progress(percent, message.to_string()));
    }

    fn emit_completed(&self) {
        self.events.lock().unwrap().push(SinkEvent::Completed);
    }

    fn emit_error(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Error(message.to_string()));
    }
}

fn assert_single_terminal(events: &[SinkEvent], expect_success: bool) {
    let terminals = events
        .iter()
        .filter(|e| matches!(e, SinkEvent::Completed | SinkEvent::Error(_)))
        .count();
    assert_eq!(terminals, 1, "exactly one terminal event: {events:?}");
    match events.last().expect("at least one event") {
        SinkEvent::Completed => assert!(expect_success, "unexpected completion: {events:?}"),
        SinkEvent::Error(_) => assert!(!expect_success, "unexpected error: {events:?}"),
        SinkEvent::Progress(..) => panic!("terminal event must come last: {events:?}"),
    }
}

fn assert_monotonic(events: &[SinkEvent]) {
    let mut last = 0u8;
    for event in events {
        if let SinkEvent::Progress(percent, _) = event {
            assert!(
                *percent >= last,
                "percent went backwards ({last} -> {percent}): {events:?}"
            );
            last = *percent;
        }
    }
}

fn quarantine_of(mc_dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(mc_dir)
        .expect("read mc dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with("world_bak_"))
                .unwrap_or(false)
        })
}

#[tokio::test]
async fn differential_restore_layers_partial_over_full() {
    let mc_dir = unique_temp_dir("differential");
    let world = mc_dir.join("world");
    std::fs::create_dir_all(&world).expect("create world");
    std::fs::write(world.join("old.txt"), b"previous world").expect("seed old world");

    let diff_dir = mc_dir.join("backups").join("world").join("differential");
    std::fs::create_dir_all(&diff_dir).expect("create differential dir");
    let full = diff_dir.join("backup_2025-10-25_14-06-05-full.zip");
    let partial = diff_dir.join("backup_2025-10-25_15-00-00-partial.zip");
    write_zip(
        &full,
        &[
            ("level.dat", b"version-x".as_slice()),
            ("region/r.0.0.mca", b"base-region".as_slice()),
        ],
    );
    write_zip(&partial, &[("level.dat", b"version-y".as_slice())]);

    let all = vec![archive_at(&full), archive_at(&partial)];
    let plan = plan(&all[1], &all).expect("differential plan");

    let control = FakeControl::running();
    let sink = RecordingSink::default();
    let mut session = RestoreSession::new(world.clone(), &control, &sink)
        .with_stop_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(5));
    session.run(&plan).await.expect("restore succeeds");
    assert_eq!(*session.phase(), RestorePhase::Completed);

    // Last-applied wins; base-only content survives.
    let level = std::fs::read(world.join("level.dat")).expect("level.dat");
    assert_eq!(level, b"version-y");
    let region = std::fs::read(world.join("region/r.0.0.mca")).expect("region file");
    assert_eq!(region, b"base-region");
    assert!(!world.join("old.txt").exists());

    // Old world parked untouched beside the new one.
    let quarantine = quarantine_of(&mc_dir).expect("quarantine dir");
    let kept = std::fs::read(quarantine.join("old.txt")).expect("quarantined file");
    assert_eq!(kept, b"previous world");

    let events = sink.events();
    assert_monotonic(&events);
    assert_single_terminal(&events, true);

    let _ = std::fs::remove_dir_all(mc_dir);
}

#[tokio::test]
async fn stuck_server_aborts_before_touching_world() {
    let mc_dir = unique_temp_dir("stuck");
    let world = mc_dir.join("world");
    std::fs::create_dir_all(&world).expect("create world");
    std::fs::write(world.join("a.txt"), b"keep me").expect("seed world");

    let snap_dir = mc_dir.join("backups").join("world").join("snapshots");
    std::fs::create_dir_all(&snap_dir).expect("create snapshots dir");
    let full = snap_dir.join("backup_2025-10-25_14-06-05-full.zip");
    write_zip(&full, &[("level.dat", b"irrelevant".as_slice())]);

    let target = archive_at(&full);
    let plan = plan(&target, std::slice::from_ref(&target)).expect("plan");

    let control = FakeControl::stuck();
    let sink = RecordingSink::default();
    let mut session = RestoreSession::new(world.clone(), &control, &sink)
        .with_stop_timeout(Duration::from_millis(40))
        .with_poll_interval(Duration::from_millis(5));
    let err = session.run(&plan).await.expect_err("must time out");
    assert!(matches!(err, RestoreError::ServerWouldNotStop { .. }));
    assert_eq!(*session.phase(), RestorePhase::Failed);

    // World untouched, no quarantine created.
    let kept = std::fs::read(world.join("a.txt")).expect("world file");
    assert_eq!(kept, b"keep me");
    assert!(quarantine_of(&mc_dir).is_none());

    let events = sink.events();
    assert_monotonic(&events);
    assert_single_terminal(&events, false);

    let _ = std::fs::remove_dir_all(mc_dir);
}

#[tokio::test]
async fn corrupt_archive_fails_and_leaves_quarantine_for_recovery() {
    let mc_dir = unique_temp_dir("corrupt");
    let world = mc_dir.join("world");
    std::fs::create_dir_all(&world).expect("create world");
    std::fs::write(world.join("old.txt"), b"previous world").expect("seed world");

    let snap_dir = mc_dir.join("backups").join("world").join("snapshots");
    std::fs::create_dir_all(&snap_dir).expect("create snapshots dir");
    let broken = snap_dir.join("backup_2025-10-25_14-06-05-full.zip");
    std::fs::write(&broken, b"this is not a zip archive").expect("write broken archive");

    let target = archive_at(&broken);
    let plan = plan(&target, std::slice::from_ref(&target)).expect("plan");

    let control = FakeControl::stopped();
    let sink = RecordingSink::default();
    let mut session = RestoreSession::new(world.clone(), &control, &sink)
        .with_stop_timeout(Duration::from_millis(40))
        .with_poll_interval(Duration::from_millis(5));
    let err = session.run(&plan).await.expect_err("extraction must fail");
    match err {
        RestoreError::ExtractionFailed { archive, .. } => {
            assert_eq!(archive, target.name);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*session.phase(), RestorePhase::Failed);

    // The previous world is recoverable from quarantine; the fresh world dir
    // is deliberately left as-is (no rollback).
    let quarantine = quarantine_of(&mc_dir).expect("quarantine dir");
    let kept = std::fs::read(quarantine.join("old.txt")).expect("quarantined file");
    assert_eq!(kept, b"previous world");
    assert!(world.exists());

    let events = sink.events();
    assert_single_terminal(&events, false);

    let _ = std::fs::remove_dir_all(mc_dir);
}

#[tokio::test]
async fn restore_with_no_previous_world_skips_quarantine() {
    let mc_dir = unique_temp_dir("fresh");
    std::fs::create_dir_all(&mc_dir).expect("create mc dir");
    let world = mc_dir.join("world");

    let snap_dir = mc_dir.join("backups").join("world").join("snapshots");
    std::fs::create_dir_all(&snap_dir).expect("create snapshots dir");
    let full = snap_dir.join("backup_2025-10-25_14-06-05-full.zip");
    write_zip(&full, &[("level.dat", b"fresh".as_slice())]);

    let target = archive_at(&full);
    let plan = plan(&target, std::slice::from_ref(&target)).expect("plan");

    let control = FakeControl::stopped();
    let sink = RecordingSink::default();
    let mut session = RestoreSession::new(world.clone(), &control, &sink)
        .with_stop_timeout(Duration::from_millis(40))
        .with_poll_interval(Duration::from_millis(5));
    session.run(&plan).await.expect("restore succeeds");

    assert!(quarantine_of(&mc_dir).is_none());
    let level = std::fs::read(world.join("level.dat")).expect("level.dat");
    assert_eq!(level, b"fresh");

    let events = sink.events();
    assert_monotonic(&events);
    assert_single_terminal(&events, true);

    let _ = std::fs::remove_dir_all(mc_dir);
}
