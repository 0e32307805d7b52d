//! JsonLinesSource - newline-delimited JSON files → blobs

use crate::hooks::{optional_u64, required_str};
use crate::{Blob, ConnectorError, ConnectorResult, HookParams, InputAdapter, ProcessedRanges};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info, warn};

const DEFAULT_BLOB_SIZE: usize = 1000;
const EXTENSIONS: [&str; 3] = ["jsonl", "ndjson", "json"];

struct OpenFile {
    location: String,
    lines: Lines<BufReader<File>>,
    /// Line offset of the next unread line
    position: u64,
}

/// Input adapter over a `.jsonl` file or a directory of them
///
/// Each blob covers `blob_size` consecutive lines of one file; its `location` is
/// the file path and its `position` the 0-based line offset. Blank and malformed
/// lines are dropped from `events` but still counted in `num_rows`.
///
/// Parameters:
/// - `path` (required): file or directory
/// - `blob_size` (optional, default 1000): lines per blob
pub struct JsonLinesSource {
    root: PathBuf,
    blob_size: usize,
    pending: VecDeque<PathBuf>,
    current: Option<OpenFile>,
    processed: ProcessedRanges,
}

impl JsonLinesSource {
    pub fn new(root: impl Into<PathBuf>, blob_size: usize) -> Self {
        Self {
            root: root.into(),
            blob_size: blob_size.max(1),
            pending: VecDeque::new(),
            current: None,
            processed: ProcessedRanges::new(),
        }
    }

    pub fn from_params(params: &HookParams) -> ConnectorResult<Self> {
        let root = required_str(params, "path")?;
        let blob_size = optional_u64(params, "blob_size")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_BLOB_SIZE);
        Ok(Self::new(root, blob_size))
    }

    async fn list_files(root: &Path) -> ConnectorResult<Vec<PathBuf>> {
        let metadata = tokio::fs::metadata(root).await.map_err(|e| {
            ConnectorError::fatal_with_source(format!("Input path {} is unavailable", root.display()), e)
        })?;

        if metadata.is_file() {
            return Ok(vec![root.to_path_buf()]);
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(root).await.map_err(|e| {
            ConnectorError::fatal_with_source(format!("Cannot list {}", root.display()), e)
        })?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext));
            if matches {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read up to `blob_size` lines; `None` at end of file
    async fn read_chunk(
        file: &mut OpenFile,
        blob_size: usize,
    ) -> std::io::Result<Option<(u64, Vec<String>)>> {
        let start = file.position;
        let mut lines = Vec::with_capacity(blob_size);
        while lines.len() < blob_size {
            match file.lines.next_line().await? {
                Some(line) => lines.push(line),
                None => break,
            }
        }
        file.position += lines.len() as u64;

        if lines.is_empty() {
            return Ok(None);
        }
        Ok(Some((start, lines)))
    }

    /// Parse each non-blank line, paired with its absolute line offset
    fn parse_lines(location: &str, start: u64, lines: &[String]) -> Vec<(u64, Value)> {
        lines
            .iter()
            .enumerate()
            .map(|(offset, line)| (start + offset as u64, line))
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(position, line)| match serde_json::from_str(line) {
                Ok(event) => Some((position, event)),
                Err(e) => {
                    warn!("Dropping malformed line {} of {}: {}", position, location, e);
                    None
                }
            })
            .collect()
    }

    /// Blob over lines `start..start + num_rows` holding only the parsed events
    fn build_blob(location: &str, start: u64, num_rows: usize, events: Vec<(u64, Value)>) -> Blob {
        let contiguous = events
            .iter()
            .enumerate()
            .all(|(index, (position, _))| *position == start + index as u64);
        let blob = if contiguous {
            Blob::new(events.into_iter().map(|(_, event)| event).collect(), location, start)
        } else {
            Blob {
                position: start,
                ..Blob::from_scattered(location, events)
            }
        };
        blob.with_num_rows(num_rows)
    }
}

#[async_trait]
impl InputAdapter for JsonLinesSource {
    fn get_location(&self) -> String {
        self.root.display().to_string()
    }

    async fn events_blobs_generator(&mut self, processed: ProcessedRanges) -> ConnectorResult<()> {
        let files = Self::list_files(&self.root).await?;
        info!(
            "Reading {} file(s) from {} ({} range(s) already processed)",
            files.len(),
            self.root.display(),
            processed.len()
        );
        self.pending = files.into();
        self.current = None;
        self.processed = processed;
        Ok(())
    }

    async fn next_blob(&mut self) -> ConnectorResult<Option<Blob>> {
        loop {
            if self.current.is_none() {
                let Some(path) = self.pending.pop_front() else {
                    return Ok(None);
                };
                match File::open(&path).await {
                    Ok(handle) => {
                        self.current = Some(OpenFile {
                            location: path.display().to_string(),
                            lines: BufReader::new(handle).lines(),
                            position: 0,
                        });
                    }
                    Err(e) => {
                        warn!("Skipping unreadable file {}: {}", path.display(), e);
                        continue;
                    }
                }
            }

            let Some(file) = self.current.as_mut() else {
                continue;
            };

            match Self::read_chunk(file, self.blob_size).await {
                Ok(Some((start, lines))) => {
                    if self.processed.contains(&file.location, start) {
                        debug!("Skipping processed range {}:{}", file.location, start);
                        continue;
                    }
                    let events = Self::parse_lines(&file.location, start, &lines);
                    let blob = Self::build_blob(&file.location, start, lines.len(), events);
                    return Ok(Some(blob));
                }
                Ok(None) => {
                    self.current = None;
                }
                Err(e) => {
                    warn!(
                        "Read error in {} at line {}, skipping rest of file: {}",
                        file.location, file.position, e
                    );
                    self.current = None;
                }
            }
        }
    }
}
