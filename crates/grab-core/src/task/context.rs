//! What a running task sees of the engine.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{Error, Result};
use crate::manager::{Document, DownloadManager, DownloadReport};
use crate::queue::{Job, JobScope, Priority};
use crate::transport::{BodySink, Request, Response, ResponseHead};

/// Handed to [`super::Task::run`]. Cheap to clone into job closures.
///
/// Every job submitted through the context counts against the task's own
/// scope, so the task finishes when its jobs are done regardless of what
/// other tasks keep queued on the same manager.
#[derive(Clone)]
pub struct TaskContext {
    manager: DownloadManager,
    scope: JobScope,
    task: String,
    base_url: Option<Url>,
    output_dir: PathBuf,
}

impl TaskContext {
    pub(crate) fn new(
        manager: &DownloadManager,
        scope: JobScope,
        task: &str,
        base_url: Option<&str>,
        output_subdir: Option<&Path>,
    ) -> Result<Self> {
        let base_url = base_url
            .map(|raw| {
                Url::parse(raw).map_err(|source| Error::InvalidUrl {
                    url: raw.to_string(),
                    source,
                })
            })
            .transpose()?;
        let output_dir = match output_subdir {
            Some(sub) => manager.output_dir().join(sub),
            None => manager.output_dir().to_path_buf(),
        };
        Ok(Self {
            manager: manager.clone(),
            scope,
            task: task.to_string(),
            base_url,
            output_dir,
        })
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    pub fn task_name(&self) -> &str {
        &self.task
    }

    /// Directory this task writes into.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Joins the task's output directory with `segments`.
    pub fn output_path<I, S>(&self, segments: I) -> PathBuf
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        segments
            .into_iter()
            .fold(self.output_dir.clone(), |dir, s| dir.join(s))
    }

    /// Returns `path` unchanged when it is already an absolute URL, otherwise
    /// resolves it against the task's base URL.
    pub fn absolute_url(&self, path: &str) -> Result<String> {
        match Url::parse(path) {
            Ok(_) => return Ok(path.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {}
            Err(source) => {
                return Err(Error::InvalidUrl {
                    url: path.to_string(),
                    source,
                })
            }
        }
        let base = self.base_url.as_ref().ok_or(Error::InvalidUrl {
            url: path.to_string(),
            source: url::ParseError::RelativeUrlWithoutBase,
        })?;
        base.join(path)
            .map(String::from)
            .map_err(|source| Error::InvalidUrl {
                url: path.to_string(),
                source,
            })
    }

    fn resolve(&self, req: impl Into<Request>) -> Result<Request> {
        let mut req = req.into();
        req.url = self.absolute_url(&req.url)?;
        Ok(req)
    }

    pub fn request(&self, req: impl Into<Request>) -> Result<Response> {
        self.manager.request(self.resolve(req)?)
    }

    pub fn stream(&self, req: impl Into<Request>, sink: &mut dyn BodySink) -> Result<ResponseHead> {
        self.manager.stream(self.resolve(req)?, sink)
    }

    pub fn fetch_parsed<D: Document>(&self, req: impl Into<Request>) -> Result<D> {
        self.manager.fetch_parsed(self.resolve(req)?)
    }

    pub fn download(&self, req: impl Into<Request>, path: impl AsRef<Path>) -> Result<DownloadReport> {
        self.manager.download(self.resolve(req)?, path)
    }

    pub fn download_observed(
        &self,
        req: impl Into<Request>,
        path: impl AsRef<Path>,
        observer: &dyn Fn(u64),
    ) -> Result<DownloadReport> {
        self.manager.download_observed(self.resolve(req)?, path, observer)
    }

    /// Enqueues a job that counts toward this task's completion.
    pub fn add_job<F>(&self, priority: impl Into<Priority>, callback: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.submit(Job::new(priority, callback))
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        self.manager.submit(job.with_ticket(self.scope.ticket()))
    }

    /// Jobs of this task that have not finished yet.
    pub fn pending_jobs(&self) -> usize {
        self.scope.pending()
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("output_dir", &self.output_dir)
            .field("pending_jobs", &self.scope.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn manager(dir: &Path) -> DownloadManager {
        DownloadManager::new(EngineConfig {
            workers: 1,
            output_dir: Some(dir.to_path_buf()),
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn absolute_url_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let ctx = TaskContext::new(
            &m,
            JobScope::new(),
            "t",
            Some("https://example.com/gallery/index.html"),
            None,
        )
        .unwrap();
        assert_eq!(
            ctx.absolute_url("https://cdn.example.com/a.jpg").unwrap(),
            "https://cdn.example.com/a.jpg"
        );
        assert_eq!(
            ctx.absolute_url("img/1.jpg").unwrap(),
            "https://example.com/gallery/img/1.jpg"
        );
        assert_eq!(
            ctx.absolute_url("/api/v1?page=2").unwrap(),
            "https://example.com/api/v1?page=2"
        );
        m.shutdown();
    }

    #[test]
    fn relative_url_without_base_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let ctx = TaskContext::new(&m, JobScope::new(), "t", None, None).unwrap();
        assert!(matches!(
            ctx.absolute_url("img/1.jpg"),
            Err(Error::InvalidUrl { .. })
        ));
        assert!(TaskContext::new(&m, JobScope::new(), "t", Some("not a url"), None).is_err());
        m.shutdown();
    }

    #[test]
    fn output_path_joins_base_subdir_and_segments() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let ctx =
            TaskContext::new(&m, JobScope::new(), "t", None, Some(Path::new("album"))).unwrap();
        assert_eq!(ctx.output_dir(), dir.path().join("album"));
        assert_eq!(
            ctx.output_path(["disc1", "track.flac"]),
            dir.path().join("album").join("disc1").join("track.flac")
        );
        m.shutdown();
    }

    #[test]
    fn jobs_count_against_scope_until_done() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let scope = JobScope::new();
        let ctx = TaskContext::new(&m, scope.clone(), "t", None, None).unwrap();
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        ctx.add_job(0, move || {
            rx.recv()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(ctx.pending_jobs(), 1);
        tx.send(()).unwrap();
        assert!(scope.wait_idle(Some(std::time::Duration::from_secs(5))));
        m.shutdown();
        assert!(matches!(ctx.add_job(0, || Ok(())), Err(Error::ShutDown)));
        assert_eq!(scope.pending(), 0);
    }
}
