//! Single-file download of an `http(s)://` URL.

use crate::registry::{FromIdentifier, RegistryBuilder};
use crate::task::{Progress, ProgressCell, Task, TaskContext};
use crate::url_model::derive_filename;

pub fn register(builder: RegistryBuilder) -> RegistryBuilder {
    builder.register::<DirectDownload>()
}

pub struct DirectDownload {
    url: String,
    file_name: String,
    progress: ProgressCell,
}

impl FromIdentifier for DirectDownload {
    const NAME: &'static str = "direct";

    fn from_identifier(identifier: &str) -> Option<Self> {
        let scheme = identifier.split_once("://")?.0;
        if !(scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")) {
            return None;
        }
        Some(Self {
            url: identifier.to_string(),
            file_name: derive_filename(identifier),
            progress: ProgressCell::new("waiting"),
        })
    }
}

impl Task for DirectDownload {
    fn name(&self) -> &str {
        &self.url
    }

    fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        let path = ctx.output_path([&self.file_name]);
        self.progress.set(0.0, format!("downloading {}", self.file_name));
        let report = ctx.download_observed(self.url.as_str(), &path, &|bytes| {
            self.progress
                .set(0.0, format!("{}: {} bytes", self.file_name, bytes));
        })?;
        tracing::info!(
            url = %report.url,
            path = %report.path.display(),
            bytes = report.bytes,
            sha256 = %report.sha256,
            "download complete"
        );
        self.progress.set(
            1.0,
            format!("{}: {} bytes, sha256 {}", self.file_name, report.bytes, report.sha256),
        );
        Ok(())
    }

    fn progress(&self) -> Progress {
        self.progress.snapshot()
    }
}
