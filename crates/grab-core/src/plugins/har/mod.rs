//! Replays the downloads recorded in an HTTP Archive (HAR) capture.
//!
//! Identifiers: `har:<path>`, `har+cookies:<path>` (replays the recorded
//! `Cookie` header) or a bare path ending in `.har`. Each selected resource
//! becomes one job; files land in a subdirectory named after the archive.

mod parse;
mod select;

pub use select::{select_resources, Resource};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::queue::{Job, Priority};
use crate::registry::{FromIdentifier, RegistryBuilder};
use crate::task::{Progress, Task, TaskContext};
use crate::transport::Request;
use crate::url_model::{derive_filename, sanitize_component};

pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder.register::<HarArchive>()
}

#[derive(Debug, Default)]
struct Counts {
    loaded: bool,
    total: u64,
    done: u64,
    failed: u64,
}

pub struct HarArchive {
    identifier: String,
    path: PathBuf,
    replay_cookies: bool,
    subdir: PathBuf,
    counts: Arc<Mutex<Counts>>,
}

impl HarArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FromIdentifier for HarArchive {
    const NAME: &'static str = "har";

    fn from_identifier(identifier: &str) -> Option<Self> {
        let (raw, replay_cookies) = if let Some(rest) = identifier.strip_prefix("har+cookies:") {
            (rest, true)
        } else if let Some(rest) = identifier.strip_prefix("har:") {
            (rest, false)
        } else if identifier.to_ascii_lowercase().ends_with(".har") && !identifier.contains("://") {
            (identifier, false)
        } else {
            return None;
        };
        if raw.is_empty() {
            return None;
        }
        let path = PathBuf::from(raw);
        let stem = path
            .file_stem()
            .map(|s| sanitize_component(&s.to_string_lossy()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "har".to_string());
        Some(Self {
            identifier: identifier.to_string(),
            path,
            replay_cookies,
            subdir: PathBuf::from(stem),
            counts: Arc::new(Mutex::new(Counts::default())),
        })
    }
}

impl Task for HarArchive {
    fn name(&self) -> &str {
        &self.identifier
    }

    fn output_subdir(&self) -> Option<&Path> {
        Some(&self.subdir)
    }

    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        let entries = parse::load(&self.path)?;
        let resources = select_resources(&entries, self.replay_cookies);
        if resources.is_empty() {
            anyhow::bail!("HAR file has no downloadable entries");
        }
        {
            let mut counts = self.counts();
            counts.total = resources.len() as u64;
            counts.loaded = true;
        }
        tracing::info!(
            task = %self.identifier,
            resources = resources.len(),
            "queueing HAR resources"
        );

        let mut names = HashSet::new();
        for res in resources {
            let file_name = unique_name(&mut names, derive_filename(&res.url), res.index);
            let path = ctx.output_path([&file_name]);
            let mut req = Request::get(res.url.as_str());
            if let Some(cookie) = res.cookie {
                req = req.header("Cookie", cookie);
            }

            let job_ctx = ctx.clone();
            let counts = Arc::clone(&self.counts);
            let priority = Priority::new([0, res.index as i64]);
            let job = Job::new(priority, move || {
                let outcome = job_ctx.download(req, &path);
                let mut counts = counts.lock().unwrap_or_else(PoisonError::into_inner);
                match outcome {
                    Ok(report) => {
                        counts.done += 1;
                        tracing::debug!(path = %report.path.display(), bytes = report.bytes, "HAR resource saved");
                        Ok(())
                    }
                    Err(e) => {
                        counts.failed += 1;
                        Err(e.into())
                    }
                }
            })
            .label(format!("har#{}", res.index));
            ctx.submit(job)?;
        }
        Ok(())
    }

    fn progress(&self) -> Progress {
        let counts = self.counts();
        if !counts.loaded {
            return Progress::new(0.0, "reading archive");
        }
        let mut status = format!("{}/{} files", counts.done, counts.total);
        if counts.failed > 0 {
            status.push_str(&format!(", {} failed", counts.failed));
        }
        Progress::ratio(counts.done + counts.failed, counts.total, status)
    }
}

/// Claims `name` in `used`, prefixing the entry index (and then a counter)
/// until it no longer clashes with a name already claimed.
fn unique_name(used: &mut HashSet<String>, name: String, index: usize) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut candidate = format!("{}-{}", index, name);
    let mut n = 1;
    while !used.insert(candidate.clone()) {
        candidate = format!("{}-{}-{}", index, n, name);
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_names_stay_distinct() {
        let mut used = HashSet::new();
        let names: Vec<String> = [("2-x", 0), ("x", 1), ("x", 2), ("x", 2), ("2-1-x", 3)]
            .into_iter()
            .map(|(name, index)| unique_name(&mut used, name.to_string(), index))
            .collect();
        assert_eq!(names, ["2-x", "x", "2-1-x", "2-2-x", "3-2-1-x"]);
        assert_eq!(used.len(), names.len());
    }

    #[test]
    fn identifier_forms() {
        let plain = HarArchive::from_identifier("har:/tmp/captures/site.har").unwrap();
        assert_eq!(plain.path(), Path::new("/tmp/captures/site.har"));
        assert!(!plain.replay_cookies);
        assert_eq!(plain.output_subdir(), Some(Path::new("site")));

        let cookies = HarArchive::from_identifier("har+cookies:dump.json").unwrap();
        assert!(cookies.replay_cookies);
        assert_eq!(cookies.path(), Path::new("dump.json"));

        assert!(HarArchive::from_identifier("Session.HAR").is_some());
        assert!(HarArchive::from_identifier("https://example.com/x.har").is_none());
        assert!(HarArchive::from_identifier("har:").is_none());
        assert!(HarArchive::from_identifier("notes.txt").is_none());
    }

    #[test]
    fn progress_before_and_after_loading() {
        let task = HarArchive::from_identifier("a.har").unwrap();
        assert_eq!(task.progress().to_string(), "0% -- reading archive");
        {
            let mut counts = task.counts();
            counts.loaded = true;
            counts.total = 4;
            counts.done = 2;
            counts.failed = 1;
        }
        assert_eq!(task.progress().to_string(), "75% -- 2/4 files, 1 failed");
    }
}
