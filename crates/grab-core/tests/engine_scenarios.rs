//! Integration tests: registry resolution, task lifecycle and job draining on
//! a live manager. No network involved.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use grab_core::task::ProgressCell;
use grab_core::{
    DownloadManager, Error, FromIdentifier, PluginRegistry, Progress, Task, TaskContext,
    TaskState,
};
use tempfile::tempdir;

/// Enqueues `jobs` no-op jobs, each bumping its own counter.
struct CountingTask {
    id: String,
    counters: Arc<Vec<AtomicUsize>>,
    progress: ProgressCell,
}

impl CountingTask {
    fn with_jobs(id: &str, jobs: usize) -> Self {
        Self {
            id: id.to_string(),
            counters: Arc::new((0..jobs).map(|_| AtomicUsize::new(0)).collect()),
            progress: ProgressCell::new("created"),
        }
    }
}

impl Task for CountingTask {
    fn name(&self) -> &str {
        &self.id
    }

    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        for i in 0..self.counters.len() {
            let counters = Arc::clone(&self.counters);
            ctx.add_job((0, i as i64), move || {
                counters[i].fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
        }
        self.progress.set(1.0, "queued");
        Ok(())
    }

    fn progress(&self) -> Progress {
        self.progress.snapshot()
    }
}

/// Hits per job of the `a:` plugin; only `two_plugin_end_to_end` starts one.
#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicUsize = AtomicUsize::new(0);
static A_HITS: [AtomicUsize; 10] = [ZERO; 10];

struct PluginA {
    id: String,
}

impl Task for PluginA {
    fn name(&self) -> &str {
        &self.id
    }

    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        for i in 0..A_HITS.len() {
            ctx.add_job((1, i as i64), move || {
                A_HITS[i].fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
        }
        Ok(())
    }

    fn progress(&self) -> Progress {
        Progress::new(0.5, "a")
    }
}

impl FromIdentifier for PluginA {
    const NAME: &'static str = "a";

    fn from_identifier(identifier: &str) -> Option<Self> {
        identifier.starts_with("a:").then(|| PluginA {
            id: identifier.to_string(),
        })
    }
}

struct PluginB(CountingTask);

impl Task for PluginB {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        self.0.run(ctx)
    }

    fn progress(&self) -> Progress {
        self.0.progress()
    }
}

impl FromIdentifier for PluginB {
    const NAME: &'static str = "b";

    fn from_identifier(identifier: &str) -> Option<Self> {
        identifier
            .starts_with("b:")
            .then(|| PluginB(CountingTask::with_jobs(identifier, 1)))
    }
}

fn manager(workers: usize) -> (DownloadManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let m = DownloadManager::new(common::test_config(dir.path(), workers, 1)).unwrap();
    (m, dir)
}

#[test]
fn two_plugin_end_to_end() {
    let registry = PluginRegistry::builder()
        .register::<PluginA>()
        .register::<PluginB>()
        .build();

    let handle = registry.resolve("a:123").unwrap();
    assert_eq!(handle.plugin(), "a");
    assert_eq!(handle.name(), "a:123");
    assert_eq!(registry.resolve("b:7").unwrap().plugin(), "b");
    assert!(matches!(
        registry.resolve("c:999"),
        Err(Error::UnsupportedIdentifier(id)) if id == "c:999"
    ));

    let (m, _dir) = manager(4);
    handle.start(&m).unwrap();
    assert!(handle.join(Some(Duration::from_secs(5))));
    assert_eq!(handle.state(), TaskState::Finished);
    assert_eq!(handle.progress().to_string(), "50% -- a");
    for (i, hits) in A_HITS.iter().enumerate() {
        assert_eq!(hits.load(Ordering::SeqCst), 1, "job {} ran once", i);
    }
    m.shutdown();
}

#[test]
fn join_zero_never_blocks() {
    let (m, _dir) = manager(1);
    let (tx, rx) = mpsc::channel::<()>();
    let rx = Mutex::new(Some(rx));

    struct Blocked(Mutex<Option<mpsc::Receiver<()>>>);
    impl Task for Blocked {
        fn name(&self) -> &str {
            "blocked"
        }
        fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
            let rx = self.0.lock().unwrap().take().unwrap();
            ctx.add_job(0, move || {
                rx.recv()?;
                Ok(())
            })?;
            Ok(())
        }
        fn progress(&self) -> Progress {
            Progress::default()
        }
    }

    let handle = grab_core::TaskHandle::new("blocked", Box::new(Blocked(rx)));
    let started = Instant::now();
    assert!(!handle.join(Some(Duration::ZERO)));
    handle.start(&m).unwrap();
    for _ in 0..50 {
        assert!(!handle.join(Some(Duration::ZERO)));
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    tx.send(()).unwrap();
    assert!(handle.join(Some(Duration::from_secs(5))));
    assert!(handle.join(Some(Duration::ZERO)));
    m.shutdown();
}

#[test]
fn join_implies_task_jobs_drained() {
    let (m, _dir) = manager(2);
    let task = CountingTask::with_jobs("drain", 50);
    let counters = Arc::clone(&task.counters);
    let handle = grab_core::TaskHandle::new("count", Box::new(task));
    handle.start(&m).unwrap();
    assert!(handle.join(None));
    assert_eq!(handle.pending_jobs(), 0);
    assert_eq!(m.pending_jobs(), 0);
    assert!(counters.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    m.shutdown();
}

#[test]
fn failing_job_does_not_stop_later_jobs() {
    let (m, _dir) = manager(1);
    let ran = Arc::new(Mutex::new(Vec::new()));
    for n in 1..=3 {
        let ran = Arc::clone(&ran);
        m.add_job(n, move || {
            ran.lock().unwrap().push(n);
            if n == 2 {
                anyhow::bail!("job {} raised", n);
            }
            Ok(())
        })
        .unwrap();
    }
    assert!(m.wait_idle(Some(Duration::from_secs(5))));
    assert_eq!(*ran.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(m.workers_alive(), 1);
    m.shutdown();
}

#[test]
fn single_worker_serves_ascending_priority_then_fifo() {
    let (m, _dir) = manager(1);
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    m.add_job(i64::MIN, move || {
        gate_rx.recv()?;
        Ok(())
    })
    .unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let jobs = [("c", (2, 0)), ("a1", (1, 0)), ("b", (1, 5)), ("a2", (1, 0)), ("z", (0, 9))];
    for (label, priority) in jobs {
        let order = Arc::clone(&order);
        m.add_job(priority, move || {
            order.lock().unwrap().push(label);
            Ok(())
        })
        .unwrap();
    }
    gate_tx.send(()).unwrap();
    assert!(m.wait_idle(Some(Duration::from_secs(5))));
    assert_eq!(*order.lock().unwrap(), vec!["z", "a1", "a2", "b", "c"]);
    m.shutdown();
}

#[test]
fn task_completion_ignores_other_tasks_jobs() {
    let (m, _dir) = manager(2);
    // A job from outside the task that stays blocked for the whole test.
    let (release_tx, release_rx) = mpsc::channel::<()>();
    m.add_job(0, move || {
        release_rx.recv()?;
        Ok(())
    })
    .unwrap();

    let handle = grab_core::TaskHandle::new("count", Box::new(CountingTask::with_jobs("own", 5)));
    handle.start(&m).unwrap();
    assert!(handle.join(Some(Duration::from_secs(5))));
    assert_eq!(m.unfinished_jobs(), 1);
    assert!(!m.wait_idle(Some(Duration::ZERO)));

    release_tx.send(()).unwrap();
    assert!(m.wait_idle(Some(Duration::from_secs(5))));
    m.shutdown();
}

#[test]
fn shutdown_drains_queued_jobs_then_rejects() {
    let (m, _dir) = manager(2);
    let hits = Arc::new(AtomicUsize::new(0));
    for i in 0..20 {
        let hits = Arc::clone(&hits);
        m.add_job(i, move || {
            std::thread::sleep(Duration::from_millis(2));
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    }
    m.shutdown();
    assert_eq!(hits.load(Ordering::SeqCst), 20);
    assert_eq!(m.workers_alive(), 0);
    assert!(matches!(m.add_job(0, || Ok(())), Err(Error::ShutDown)));
}

#[test]
fn failed_run_leaves_manager_usable() {
    struct Broken;
    impl Task for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn run(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
            anyhow::bail!("index page missing")
        }
        fn progress(&self) -> Progress {
            Progress::new(0.0, "broken")
        }
    }

    let (m, _dir) = manager(2);
    let broken = grab_core::TaskHandle::new("broken", Box::new(Broken));
    broken.start(&m).unwrap();
    assert!(broken.join(Some(Duration::from_secs(5))));
    assert_eq!(
        broken.state(),
        TaskState::Failed("index page missing".to_string())
    );

    let ok = grab_core::TaskHandle::new("count", Box::new(CountingTask::with_jobs("ok", 3)));
    ok.start(&m).unwrap();
    assert!(ok.join(Some(Duration::from_secs(5))));
    assert_eq!(ok.state(), TaskState::Finished);
    m.shutdown();
}
