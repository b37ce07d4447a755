// yt-dlp backed extraction
//
// Metadata comes from `--dump-json`; payloads are streamed from the engine's
// stdout (`-o -`) so nothing is staged on disk.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::traits::{ByteStream, MediaExtractor, OpenedStream, SelectedVariant};
use super::{ExtractionError, Result};
use crate::config::ExtractorConfig;
use crate::models::{Locator, MediaMetadata, VariantDescriptor};
use crate::service::format::format_size;

/// Stderr lines kept for error reporting
const STDERR_TAIL_LINES: usize = 20;

/// Extraction adapter driving the `yt-dlp` executable
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: String,
    extra_args: Vec<String>,
    timeout: Duration,
    chunk_size: usize,
    default_format: String,
}

impl YtDlpExtractor {
    #[must_use]
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            extra_args: config.extra_args.clone(),
            timeout: config.timeout(),
            chunk_size: config.chunk_size.max(1),
            default_format: config.default_format.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run `--dump-json`, optionally for a specific format selector
    async fn dump_json(&self, locator: &Locator, format: Option<&str>) -> Result<RawInfo> {
        let mut cmd = self.command();
        cmd.args(["--dump-json", "--no-playlist", "--no-warnings"]);
        if let Some(format) = format {
            cmd.args(["-f", format]);
        }
        cmd.arg("--").arg(locator.as_str());

        debug!(binary = %self.binary, locator = %locator, ?format, "Querying extraction engine");

        // kill_on_drop reaps the engine if the timeout fires
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(upstream_error(stderr.lines(), output.status));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractionError::InvalidOutput(format!("engine returned invalid JSON: {e}")))
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, locator: &Locator) -> Result<MediaMetadata> {
        let info = self.dump_json(locator, None).await?;
        Ok(info.into_metadata())
    }

    async fn open_stream(&self, locator: &Locator, variant: Option<&str>) -> Result<OpenedStream> {
        let selector = variant.unwrap_or(&self.default_format);

        // Learn what the selector resolves to before committing to a payload
        let info = self.dump_json(locator, Some(selector)).await?;
        let selected = info.selected_variant()?;
        let metadata = info.into_metadata();

        let mut cmd = self.command();
        cmd.args(["-f", selector])
            .args(["-o", "-", "--quiet", "--no-warnings", "--no-playlist", "--no-part"])
            .arg("--")
            .arg(locator.as_str());

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::InvalidOutput("engine stdout unavailable".to_string()))?;
        let stderr = child.stderr.take().map(collect_stderr_tail);

        let mut payload = EngineStream {
            reader: ReaderStream::with_capacity(stdout, self.chunk_size),
            child,
            stderr,
        }
        .into_stream();

        // Hold the first chunk back so an engine that dies before producing
        // anything is still reported as an extraction failure
        let first = tokio::time::timeout(self.timeout, payload.next())
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))?;

        let stream: ByteStream = match first {
            Some(Ok(chunk)) => stream::once(async move { Ok(chunk) }).chain(payload).boxed(),
            Some(Err(e)) => return Err(ExtractionError::Upstream(e.to_string())),
            None => stream::empty().boxed(),
        };

        Ok(OpenedStream {
            metadata,
            variant: selected,
            stream,
        })
    }
}

/// Running engine process whose stdout is the payload
struct EngineStream {
    reader: ReaderStream<ChildStdout>,
    child: Child,
    stderr: Option<JoinHandle<Vec<String>>>,
}

impl EngineStream {
    fn into_stream(self) -> ByteStream {
        stream::unfold(Some(self), |state| async move {
            let mut state = state?;
            match state.reader.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), Some(state))),
                Some(Err(e)) => Some((Err(e), None)),
                // EOF only counts as success if the engine says so
                None => state.finish().await.err().map(|e| (Err(e), None)),
            }
        })
        .boxed()
    }

    async fn finish(mut self) -> std::io::Result<()> {
        let status = self.child.wait().await?;
        if status.success() {
            return Ok(());
        }

        let lines = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let err = upstream_error(lines.iter().map(String::as_str), status);
        warn!(%status, error = %err, "Extraction engine failed mid-stream");
        Err(std::io::Error::other(err.to_string()))
    }
}

/// Drain stderr concurrently so the engine never blocks on a full pipe
fn collect_stderr_tail(stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect()
    })
}

fn upstream_error<'a>(stderr: impl Iterator<Item = &'a str>, status: ExitStatus) -> ExtractionError {
    let message = stderr
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if message.is_empty() {
        ExtractionError::Upstream(format!("extraction engine exited with {status}"))
    } else {
        ExtractionError::Upstream(message)
    }
}

/// Subset of the engine's info dictionary the gateway uses
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    duration_string: Option<String>,
    uploader: Option<String>,
    formats: Vec<RawFormat>,
    webpage_url: Option<String>,
    description: Option<String>,
    view_count: Option<u64>,
    like_count: Option<u64>,
    // Populated for the selected format when `-f` was given
    format_id: Option<String>,
    ext: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    resolution: Option<String>,
    filesize: Option<u64>,
    format_note: Option<String>,
}

impl RawInfo {
    fn selected_variant(&self) -> Result<SelectedVariant> {
        let ext = self
            .ext
            .clone()
            .ok_or_else(|| ExtractionError::InvalidOutput("selected format has no extension".to_string()))?;

        Ok(SelectedVariant {
            format_id: self.format_id.clone().unwrap_or_default(),
            ext,
            filesize: self
                .filesize
                .or_else(|| self.filesize_approx.map(|approx| approx as u64)),
        })
    }

    fn into_metadata(self) -> MediaMetadata {
        let mut seen = std::collections::HashSet::new();
        let formats = self
            .formats
            .into_iter()
            .filter_map(|f| {
                let ext = f.ext?;
                let format_id = f.format_id?;
                if !seen.insert(format_id.clone()) {
                    return None;
                }
                Some(VariantDescriptor {
                    format_id,
                    ext,
                    resolution: f.resolution.unwrap_or_else(|| "N/A".to_string()),
                    filesize: f.filesize,
                    filesize_fmt: format_size(f.filesize),
                    note: f.format_note.unwrap_or_else(|| "N/A".to_string()),
                })
            })
            .collect();

        MediaMetadata {
            id: self.id.unwrap_or_default(),
            title: self.title.unwrap_or_else(|| "video".to_string()),
            thumbnail: self.thumbnail,
            duration: self.duration,
            duration_string: self.duration_string,
            uploader: self.uploader,
            formats,
            webpage_url: self.webpage_url,
            description: self.description,
            view_count: self.view_count,
            like_count: self.like_count,
        }
    }
}
