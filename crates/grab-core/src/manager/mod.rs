//! Download manager: the engine facade shared by every running task.
//!
//! Owns the transport pool, the job queue and the worker pool, all created
//! once from an [`EngineConfig`] and fixed for the manager's lifetime. The
//! manager is a cheap clonable handle; tasks and jobs hold clones of it.

mod document;
mod download;

pub use document::{Document, Json};
pub use download::{DownloadReport, PART_SUFFIX};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::queue::{Job, JobQueue, Priority};
use crate::transport::{BodySink, Request, Response, ResponseHead, TransportPool};
use crate::worker::WorkerPool;

struct Inner {
    config: EngineConfig,
    output_dir: PathBuf,
    transport: TransportPool,
    queue: Arc<JobQueue>,
    workers: Mutex<Option<WorkerPool>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Lets idle workers leave their loop; they are not joined here.
        self.queue.close();
    }
}

#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Builds the transport pool and starts `config.workers` worker threads.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let queue = Arc::new(JobQueue::new());
        let workers = WorkerPool::spawn(config.workers, Arc::clone(&queue))?;
        let transport = TransportPool::from_config(&config);
        tracing::info!(
            workers = workers.size(),
            max_connections = transport.capacity(),
            "download manager started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                output_dir: config.output_dir(),
                config,
                transport,
                queue,
                workers: Mutex::new(Some(workers)),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Base directory tasks write under.
    pub fn output_dir(&self) -> &Path {
        &self.inner.output_dir
    }

    pub fn transport(&self) -> &TransportPool {
        &self.inner.transport
    }

    /// Issues a request through the shared transport pool and buffers the body.
    pub fn request(&self, req: impl Into<Request>) -> Result<Response> {
        let req = req.into();
        Ok(self.inner.transport.fetch(&req)?)
    }

    /// Issues a request and hands the body to `sink` as it arrives.
    pub fn stream(&self, req: impl Into<Request>, sink: &mut dyn BodySink) -> Result<ResponseHead> {
        let req = req.into();
        Ok(self.inner.transport.execute(&req, sink)?)
    }

    /// Fetches and parses the body as `D`.
    pub fn fetch_parsed<D: Document>(&self, req: impl Into<Request>) -> Result<D> {
        let response = self.request(req)?;
        let url = response.url().to_string();
        D::parse(response).map_err(|source| Error::Parse { url, source })
    }

    /// Streams the body to `path` through a unique `.part` file beside it. On
    /// failure `path` is untouched and the part file is removed.
    pub fn download(&self, req: impl Into<Request>, path: impl AsRef<Path>) -> Result<DownloadReport> {
        download::download_to(&self.inner.transport, &req.into(), path.as_ref(), None)
    }

    /// Like [`download`](Self::download), calling `observer` with the running
    /// byte count after every chunk.
    pub fn download_observed(
        &self,
        req: impl Into<Request>,
        path: impl AsRef<Path>,
        observer: &dyn Fn(u64),
    ) -> Result<DownloadReport> {
        download::download_to(
            &self.inner.transport,
            &req.into(),
            path.as_ref(),
            Some(observer),
        )
    }

    /// Enqueues `callback` at `priority`. Lower priorities run first; equal
    /// priorities run in submission order.
    pub fn add_job<F>(&self, priority: impl Into<Priority>, callback: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.submit(Job::new(priority, callback))
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        self.inner.queue.put(job)
    }

    /// Waits until every job submitted to this manager has finished.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        self.inner.queue.join(timeout)
    }

    /// Jobs waiting for a worker.
    pub fn pending_jobs(&self) -> usize {
        self.inner.queue.len()
    }

    /// Jobs waiting plus jobs executing.
    pub fn unfinished_jobs(&self) -> usize {
        self.inner.queue.unfinished()
    }

    pub fn workers_alive(&self) -> usize {
        self.lock_workers().as_ref().map_or(0, WorkerPool::alive)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.queue.is_closed()
    }

    /// Stops accepting jobs, lets the workers drain what is queued and joins
    /// them. Safe to call more than once; when called from a worker thread
    /// that worker is not joined.
    pub fn shutdown(&self) {
        self.inner.queue.close();
        let pool = self.lock_workers().take();
        if let Some(pool) = pool {
            if pool.is_worker_thread(thread::current().id()) {
                tracing::debug!("shutdown called from a worker; skipping self-join");
            }
            pool.join();
            tracing::info!("download manager shut down");
        }
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Option<WorkerPool>> {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("output_dir", &self.inner.output_dir)
            .field("queue", &self.inner.queue)
            .field("max_connections", &self.inner.transport.capacity())
            .finish()
    }
}
