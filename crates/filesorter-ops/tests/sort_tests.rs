use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filesorter_ops::{
    CopyOptions, CopyScheduler, DestinationNamer, FileDescriptor, MemorySink, NullSink, Outcome,
    OutcomeRecord, OutcomeReporter, OutcomeSink, SetupError, SortConfig, SortSummary, Sorter,
    SortingTask, classify,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn config(source: &Path, dest: &Path, recursive: bool) -> SortConfig {
    SortConfig::builder()
        .source_root(source)
        .destination_root(dest)
        .recursive(recursive)
        .concurrency(4usize)
        .build()
        .unwrap()
}

fn sorter(config: SortConfig) -> Sorter {
    Sorter::new(config).with_sink(Arc::new(NullSink))
}

fn names_in(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_recursive_duplicate_names_are_disambiguated() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir(src.path().join("sub")).unwrap();
    fs::write(src.path().join("a.txt"), "top a").unwrap();
    fs::write(src.path().join("b.txt"), "top b").unwrap();
    fs::write(src.path().join("sub/a.txt"), "nested a").unwrap();

    let summary = sorter(config(src.path(), dst.path(), true)).run().await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
    let txt = dst.path().join("txt");
    let names = names_in(&txt);
    assert_eq!(names.len(), 3);
    assert!(names.contains("a.txt"));
    assert!(names.contains("b.txt"));
    assert!(names.contains("a_1.txt"));

    // Walk order is depth-first by name, so the top-level file keeps its name.
    assert_eq!(fs::read_to_string(txt.join("a.txt")).unwrap(), "top a");
    assert_eq!(fs::read_to_string(txt.join("b.txt")).unwrap(), "top b");
    assert_eq!(fs::read_to_string(txt.join("a_1.txt")).unwrap(), "nested a");
}

#[tokio::test]
async fn test_extensionless_file_goes_to_no_extension() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("README"), "read me").unwrap();

    let summary = sorter(config(src.path(), dst.path(), false)).run().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    let copied = dst.path().join("no_extension/README");
    assert_eq!(fs::read_to_string(copied).unwrap(), "read me");
}

#[tokio::test]
async fn test_missing_source_fails_before_destination_is_created() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let missing = src.path().join("does-not-exist");
    let dest_root = dst.path().join("out");

    let err = sorter(config(&missing, &dest_root, true)).run().await.unwrap_err();

    assert!(matches!(err, SetupError::NotFound { .. }));
    assert!(!dest_root.exists());
}

#[tokio::test]
async fn test_source_file_is_not_a_directory() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("file.txt"), "x").unwrap();

    let err = sorter(config(&src.path().join("file.txt"), dst.path(), false))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, SetupError::NotADirectory { .. }));
}

#[tokio::test]
async fn test_uncreatable_destination() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(dst.path().join("blocker"), "x").unwrap();

    let err = sorter(config(src.path(), &dst.path().join("blocker/out"), false))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, SetupError::DestinationUncreatable { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buckets_match_extensions_and_bytes_match() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir_all(src.path().join("x/y")).unwrap();

    let files = [
        "one.txt", "two.TXT", "x/three.rs", "x/y/four.rs", "x/five.png", "LICENSE", "x/y/Makefile",
        "x/one.txt",
    ];
    for (i, name) in files.iter().enumerate() {
        fs::write(src.path().join(name), format!("content {i} of {name}")).unwrap();
    }

    let summary = sorter(config(src.path(), dst.path(), true)).run().await.unwrap();
    assert_eq!(summary.succeeded, files.len());
    assert_eq!(summary.failed, 0);

    let buckets = names_in(dst.path());
    let expected: BTreeSet<String> = ["txt", "rs", "png", "no_extension"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(buckets, expected);

    let mut copied = 0;
    for bucket in &buckets {
        for name in names_in(&dst.path().join(bucket)) {
            assert_eq!(classify(&name).as_str(), bucket.as_str());
            copied += 1;
        }
    }
    assert_eq!(copied, files.len());

    // Every source's bytes exist under its bucket, and sources are untouched.
    for (i, name) in files.iter().enumerate() {
        let expected = format!("content {i} of {name}");
        let src_path = src.path().join(name);
        assert_eq!(fs::read_to_string(&src_path).unwrap(), expected);

        let bucket = dst.path().join(classify(name).as_str());
        let found = fs::read_dir(bucket)
            .unwrap()
            .any(|e| fs::read_to_string(e.unwrap().path()).unwrap() == expected);
        assert!(found, "no byte-identical copy of {name}");
    }
}

#[tokio::test]
async fn test_non_recursive_skips_nested_files() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir(src.path().join("nested")).unwrap();
    fs::write(src.path().join("nested/deep.txt"), "x").unwrap();
    fs::write(src.path().join("top.md"), "y").unwrap();

    let summary = sorter(config(src.path(), dst.path(), false)).run().await.unwrap();

    assert_eq!(summary.total, 1);
    assert!(dst.path().join("md/top.md").exists());
    assert!(!dst.path().join("txt").exists());
}

#[tokio::test]
async fn test_existing_destination_files_are_kept() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir(dst.path().join("txt")).unwrap();
    fs::write(dst.path().join("txt/a.txt"), "already here").unwrap();
    fs::write(src.path().join("a.txt"), "incoming").unwrap();

    let summary = sorter(config(src.path(), dst.path(), false)).run().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(
        fs::read_to_string(dst.path().join("txt/a.txt")).unwrap(),
        "already here"
    );
    assert_eq!(
        fs::read_to_string(dst.path().join("txt/a_1.txt")).unwrap(),
        "incoming"
    );
}

#[tokio::test]
async fn test_destination_inside_source_is_not_resorted() {
    let src = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "a").unwrap();
    fs::write(src.path().join("b.log"), "b").unwrap();
    let dest_root = src.path().join("sorted");

    let first = sorter(config(src.path(), &dest_root, true)).run().await.unwrap();
    let second = sorter(config(src.path(), &dest_root, true)).run().await.unwrap();

    assert_eq!(first.succeeded, 2);
    assert_eq!(second.succeeded, 2);
    assert_eq!(names_in(&dest_root.join("txt")).len(), 2);
    assert_eq!(names_in(&dest_root.join("log")).len(), 2);
}

#[tokio::test]
async fn test_sink_receives_one_record_per_file() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for i in 0..5 {
        fs::write(src.path().join(format!("{i}.csv")), "x").unwrap();
    }

    let sink = Arc::new(MemorySink::new());
    let summary = Sorter::new(config(src.path(), dst.path(), false))
        .with_sink(sink.clone())
        .run()
        .await
        .unwrap();

    let records = sink.records();
    assert_eq!(summary.succeeded, 5);
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.outcome == Outcome::Succeeded));
    assert!(records.iter().all(|r| r.destination.is_some()));
}

#[tokio::test]
async fn test_cancelled_run_admits_nothing() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for i in 0..10 {
        fs::write(src.path().join(format!("{i}.txt")), "x").unwrap();
    }

    let token = CancellationToken::new();
    token.cancel();
    let summary = sorter(config(src.path(), dst.path(), false))
        .with_cancellation(token)
        .run()
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total, 0);
    assert!(!summary.is_success());
}

/// Reserve destinations for every file directly under `src`.
async fn reserved_tasks(src: &Path, namer: &DestinationNamer) -> Vec<SortingTask> {
    let mut paths: Vec<_> = fs::read_dir(src).unwrap().map(|e| e.unwrap().path()).collect();
    paths.sort();

    let mut tasks = Vec::new();
    for path in paths {
        let desc = FileDescriptor::from_path(src, path).unwrap();
        let dest = namer.reserve(desc.bucket(), desc.name()).await.unwrap();
        tasks.push(SortingTask::new(desc, dest));
    }
    tasks
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_failure_does_not_stop_the_batch() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for i in 0..10 {
        fs::write(src.path().join(format!("file{i}.dat")), format!("{i}")).unwrap();
    }

    let namer = DestinationNamer::new(dst.path(), 100);
    let tasks = reserved_tasks(src.path(), &namer).await;

    // The source disappears after its destination was reserved.
    let lost = src.path().join("file3.dat");
    fs::remove_file(&lost).unwrap();

    let (tx, rx) = mpsc::channel(16);
    for task in tasks {
        tx.send(task).await.unwrap();
    }
    drop(tx);

    let sink = Arc::new(MemorySink::new());
    let summary = CopyScheduler::new(3)
        .run(rx, OutcomeReporter::new(sink.clone()))
        .await;

    assert_eq!(summary.total, 10);
    assert_eq!(summary.succeeded, 9);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].source, lost);
    assert!(!summary.failures[0].reason.is_empty());
    assert!(!dst.path().join("dat/file3.dat").exists());
    assert_eq!(names_in(&dst.path().join("dat")).len(), 9);
    assert_eq!(sink.records().len(), 10);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_source_is_recorded() {
    use std::os::unix::fs::PermissionsExt;

    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for i in 0..10 {
        fs::write(src.path().join(format!("file{i}.dat")), "x").unwrap();
    }
    let locked = src.path().join("file7.dat");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users read through permission bits.
    if fs::File::open(&locked).is_ok() {
        return;
    }

    let summary = sorter(config(src.path(), dst.path(), false)).run().await.unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(summary.succeeded, 9);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].source.file_name().unwrap(), "file7.dat");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_is_respected() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for i in 0..40 {
        fs::write(src.path().join(format!("f{i}.bin")), vec![i as u8; 256 * 1024]).unwrap();
    }

    let namer = DestinationNamer::new(dst.path(), 100);
    let tasks = reserved_tasks(src.path(), &namer).await;

    let (tx, rx) = mpsc::channel(64);
    for task in tasks {
        tx.send(task).await.unwrap();
    }
    drop(tx);

    let scheduler = CopyScheduler::new(2);
    let summary = scheduler
        .run(rx, OutcomeReporter::new(Arc::new(NullSink)))
        .await;

    assert_eq!(summary.succeeded, 40);
    assert!(scheduler.peak_in_flight() >= 1);
    assert!(scheduler.peak_in_flight() <= 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_source_root_fails_setup() {
    use std::os::unix::fs::PermissionsExt;

    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let root = src.path().join("locked");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.txt"), "a").unwrap();
    fs::set_permissions(&root, fs::Permissions::from_mode(0o300)).unwrap();
    let dest_root = dst.path().join("out");

    // Privileged users list directories regardless of permission bits.
    if fs::read_dir(&root).is_ok() {
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = sorter(config(&root, &dest_root, true)).run().await;
    fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(result, Err(SetupError::PermissionDenied { .. })));
    assert!(!dest_root.exists());
}

#[tokio::test]
async fn test_destination_equal_to_source_is_rejected() {
    let src = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "a").unwrap();

    let err = sorter(config(src.path(), src.path(), true))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, SetupError::InvalidConfig { .. }));
    assert!(!src.path().join("txt").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_utf8_name_is_copied_verbatim() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let name = OsStr::from_bytes(b"caf\xe9.txt");

    // Some filesystems only accept UTF-8 names.
    if fs::write(src.path().join(name), "latin-1").is_err() {
        return;
    }

    let summary = sorter(config(src.path(), dst.path(), false)).run().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    let names: Vec<_> = fs::read_dir(dst.path().join("txt"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![name.to_os_string()]);
    assert_eq!(
        fs::read_to_string(dst.path().join("txt").join(name)).unwrap(),
        "latin-1"
    );
}

#[cfg(unix)]
/// Fails the run's reservation stage on the first skipped path.
struct RejectSkipped;

#[cfg(unix)]
impl OutcomeSink for RejectSkipped {
    fn emit(&self, record: &OutcomeRecord) {
        if record.outcome == Outcome::Skipped {
            panic!("sink rejected {}", record.source.display());
        }
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_survives_failed_reservation_stage() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir(src.path().join("real")).unwrap();
    fs::write(src.path().join("a.txt"), "a").unwrap();
    std::os::unix::fs::symlink(src.path().join("real"), src.path().join("link")).unwrap();

    let summary = Sorter::new(config(src.path(), dst.path(), false))
        .with_sink(Arc::new(RejectSkipped))
        .run()
        .await
        .unwrap();

    // "a.txt" was handed over before the stage died on "link".
    assert_eq!(summary.succeeded, 1);
    assert!(summary.traversal_errors.is_empty());
    assert!(dst.path().join("txt/a.txt").exists());
}

#[cfg(unix)]
const STREAM_CHUNK: usize = 4096;

/// A FIFO source that delivers one chunk, then a second once released.
#[cfg(unix)]
struct GatedSource {
    release: std::sync::mpsc::Sender<()>,
    writer: std::thread::JoinHandle<()>,
}

#[cfg(unix)]
fn gated_source(path: &Path) -> Option<GatedSource> {
    use std::io::Write;

    let made = std::process::Command::new("mkfifo")
        .arg(path)
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    if !made {
        return None;
    }

    let (release, resume) = std::sync::mpsc::channel::<()>();
    let fifo = path.to_path_buf();
    let writer = std::thread::spawn(move || {
        let mut out = fs::OpenOptions::new().write(true).open(&fifo).unwrap();
        out.write_all(&[1u8; STREAM_CHUNK]).unwrap();
        let _ = resume.recv();
        // An aborted copy has already closed the read end.
        let _ = out.write_all(&[2u8; STREAM_CHUNK]);
    });

    Some(GatedSource { release, writer })
}

#[cfg(unix)]
/// Wait until the destination of a gated copy holds the first chunk.
async fn wait_for_first_chunk(dest: &Path) {
    let arrived = async {
        while fs::metadata(dest).map(|m| m.len()).unwrap_or(0) < STREAM_CHUNK as u64 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), arrived)
        .await
        .expect("copy of the gated source never started");
}

#[cfg(unix)]
struct CancelledRun {
    summary: SortSummary,
    records: Vec<OutcomeRecord>,
    dest_dir: PathBuf,
    _dirs: (TempDir, TempDir),
}

/// Cancel a two-slot scheduler while a copy is half done, then offer more work.
#[cfg(unix)]
async fn cancel_during_copy(abort_on_cancel: bool) -> Option<CancelledRun> {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let gate = gated_source(&src.path().join("stream.bin"))?;
    for name in ["a.bin", "b.bin", "c.bin", "d.bin"] {
        fs::write(src.path().join(name), vec![9u8; STREAM_CHUNK]).unwrap();
    }

    let dest_dir = dst.path().join("bin");
    fs::create_dir(&dest_dir).unwrap();
    let task_for = |name: &str| {
        let desc = FileDescriptor::from_path(src.path(), src.path().join(name)).unwrap();
        SortingTask::new(desc, dest_dir.join(name))
    };

    let token = CancellationToken::new();
    let scheduler = CopyScheduler::new(2)
        .with_options(CopyOptions {
            preserve_timestamps: true,
            abort_on_cancel,
        })
        .with_cancellation(token.clone());
    let sink = Arc::new(MemorySink::new());
    let (tx, rx) = mpsc::channel(8);

    let streaming = dest_dir.join("stream.bin");
    let release = gate.release;
    let control = async {
        tx.send(task_for("stream.bin")).await.unwrap();
        tx.send(task_for("a.bin")).await.unwrap();
        wait_for_first_chunk(&streaming).await;

        token.cancel();
        for name in ["b.bin", "c.bin", "d.bin"] {
            // The scheduler may already have closed the channel.
            let _ = tx.send(task_for(name)).await;
        }
        drop(tx);
        release.send(()).unwrap();
    };

    let (summary, ()) = tokio::join!(
        scheduler.run(rx, OutcomeReporter::new(sink.clone())),
        control
    );
    gate.writer.join().unwrap();

    Some(CancelledRun {
        summary,
        records: sink.records(),
        dest_dir,
        _dirs: (src, dst),
    })
}

#[cfg(unix)]
fn record_for<'a>(records: &'a [OutcomeRecord], name: &str) -> &'a OutcomeRecord {
    records
        .iter()
        .find(|r| r.source.file_name().unwrap() == name)
        .unwrap_or_else(|| panic!("no record for {name}"))
}

#[cfg(unix)]
fn assert_only_admitted_tasks_reported(run: &CancelledRun) {
    assert!(run.summary.cancelled);
    assert_eq!(run.summary.total, 2);
    assert_eq!(run.records.len(), 2);
    record_for(&run.records, "stream.bin");
    record_for(&run.records, "a.bin");

    for name in ["b.bin", "c.bin", "d.bin"] {
        assert!(!run.dest_dir.join(name).exists(), "{name} was admitted after cancel");
    }

    // Whatever "a.bin" did, it left either a full copy or nothing.
    let a = record_for(&run.records, "a.bin");
    match a.outcome {
        Outcome::Succeeded => assert_eq!(
            fs::metadata(run.dest_dir.join("a.bin")).unwrap().len(),
            STREAM_CHUNK as u64
        ),
        _ => assert!(!run.dest_dir.join("a.bin").exists()),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_lets_in_flight_copy_finish() {
    let Some(run) = cancel_during_copy(false).await else {
        return;
    };

    assert_only_admitted_tasks_reported(&run);

    let stream = record_for(&run.records, "stream.bin");
    assert_eq!(stream.outcome, Outcome::Succeeded);
    let copied = fs::read(run.dest_dir.join("stream.bin")).unwrap();
    assert_eq!(copied.len(), 2 * STREAM_CHUNK);
    assert!(copied[..STREAM_CHUNK].iter().all(|&b| b == 1));
    assert!(copied[STREAM_CHUNK..].iter().all(|&b| b == 2));
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_aborts_in_flight_copy_when_configured() {
    let Some(run) = cancel_during_copy(true).await else {
        return;
    };

    assert_only_admitted_tasks_reported(&run);

    let stream = record_for(&run.records, "stream.bin");
    assert_eq!(stream.outcome, Outcome::Failed);
    assert!(stream.error.as_deref().unwrap().contains("cancelled"));
    assert!(!run.dest_dir.join("stream.bin").exists(), "partial copy left behind");

    assert!(run.summary.failures.iter().all(|f| f.reason.contains("cancelled")));
    assert!(!run.summary.is_success());
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_after_admission_finished_is_not_a_cancelled_run() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let source = src.path().join("stream.bin");
    let Some(gate) = gated_source(&source) else {
        return;
    };
    let dest = dst.path().join("stream.bin");

    let token = CancellationToken::new();
    let scheduler = CopyScheduler::new(2).with_cancellation(token.clone());
    let (tx, rx) = mpsc::channel(1);

    let desc = FileDescriptor::from_path(src.path(), &source).unwrap();
    tx.send(SortingTask::new(desc, dest.clone())).await.unwrap();
    drop(tx);

    let release = gate.release;
    let control = async {
        // Every task has been admitted once the copy is running.
        wait_for_first_chunk(&dest).await;
        token.cancel();
        release.send(()).unwrap();
    };

    let (summary, ()) = tokio::join!(
        scheduler.run(rx, OutcomeReporter::new(Arc::new(NullSink))),
        control
    );
    gate.writer.join().unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.is_success());
    assert_eq!(fs::metadata(&dest).unwrap().len(), 2 * STREAM_CHUNK as u64);
}
