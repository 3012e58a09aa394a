//! Run journal - where event logs live
//!
//! Directory structure of the file-backed store:
//! ```text
//! .aos-data/
//!   runs/
//!     {run_id}/
//!       events.jsonl            # First segment (newline-delimited JSON)
//!       events.resume-1.jsonl   # Continuation written by the first resume
//!       events.resume-2.jsonl   # ...
//!       artifacts/              # Files produced by tools
//! ```
//!
//! Segments of one run are logically concatenated in order for replay.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::event::RunEvent;
use super::replay::{RunLog, RunState};
use super::sink::{lock, EventSink, JsonlEventSink, MemoryEventSink};
use crate::{Error, Result};

const FIRST_SEGMENT: &str = "events.jsonl";
const RESUME_PREFIX: &str = "events.resume-";
const SEGMENT_SUFFIX: &str = ".jsonl";

/// Storage for run event logs
pub trait RunJournal: Send + Sync {
    /// Open a new segment for `run_id`; the first call creates the run
    fn open_segment(&self, run_id: &str) -> Result<Box<dyn EventSink>>;

    /// Load every event of `run_id`, segments concatenated in order
    fn load_events(&self, run_id: &str) -> Result<Vec<RunEvent>>;

    /// Directory for files produced during the run, if the journal keeps any
    fn artifact_location(&self, _run_id: &str) -> Option<PathBuf> {
        None
    }
}

/// Summary of a stored run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub agent_name: Option<String>,
    pub state: RunState,
    pub event_count: usize,
    pub started_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn from_log(run_id: impl Into<String>, log: &RunLog) -> Self {
        Self {
            run_id: run_id.into(),
            agent_name: log.agent_name().map(str::to_string),
            state: log.state(),
            event_count: log.len(),
            started_at: log.started_at(),
        }
    }
}

/// File-backed run journal
#[derive(Debug, Clone)]
pub struct RunStore {
    base_dir: PathBuf,
}

impl RunStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: data_dir.as_ref().join("runs"),
        }
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::RunNotFound(run_id.to_string()));
        }
        Ok(self.base_dir.join(run_id))
    }

    /// Directory where tools may place files produced for this run
    pub fn artifacts_dir(&self, run_id: &str) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join("artifacts"))
    }

    /// Existing segment files of a run, in replay order
    pub fn segment_paths(&self, run_id: &str) -> Result<Vec<PathBuf>> {
        let dir = self.run_dir(run_id)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut continuations = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(index) = resume_index(name) {
                continuations.push((index, entry.path()));
            }
        }
        continuations.sort_by_key(|(index, _)| *index);

        let mut paths = Vec::with_capacity(continuations.len() + 1);
        let first = dir.join(FIRST_SEGMENT);
        if first.exists() {
            paths.push(first);
        }
        paths.extend(continuations.into_iter().map(|(_, path)| path));
        Ok(paths)
    }

    fn next_segment_path(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(run_id)?;
        let existing = self.segment_paths(run_id)?;
        if existing.is_empty() {
            return Ok(dir.join(FIRST_SEGMENT));
        }
        Ok(dir.join(format!("{}{}{}", RESUME_PREFIX, existing.len(), SEGMENT_SUFFIX)))
    }

    fn load_segment(path: &Path) -> Result<Vec<RunEvent>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("Failed to read line {} in {}: {}", line_num, path.display(), e);
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<RunEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(
                        "Failed to parse event at line {} in {}: {}",
                        line_num,
                        path.display(),
                        e
                    );
                    continue;
                }
            }
        }

        Ok(events)
    }

    /// List stored runs, newest first
    pub fn list_runs(&self) -> Result<Vec<RunSummary>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(run_id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            match self.load_events(run_id) {
                Ok(events) if !events.is_empty() => {
                    runs.push(RunSummary::from_log(run_id, &RunLog::new(events)));
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to load run {}: {}", run_id, e);
                    continue;
                }
            }
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    /// Delete a run and all of its segments
    pub fn delete_run(&self, run_id: &str) -> Result<()> {
        let dir = self.run_dir(run_id)?;
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            debug!("Deleted run directory: {}", dir.display());
        }
        Ok(())
    }
}

fn resume_index(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(RESUME_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

impl RunJournal for RunStore {
    fn open_segment(&self, run_id: &str) -> Result<Box<dyn EventSink>> {
        let path = self.next_segment_path(run_id)?;
        Ok(Box::new(JsonlEventSink::create(path)?))
    }

    fn load_events(&self, run_id: &str) -> Result<Vec<RunEvent>> {
        let mut events = Vec::new();
        for path in self.segment_paths(run_id)? {
            events.extend(Self::load_segment(&path)?);
        }
        Ok(events)
    }

    fn artifact_location(&self, run_id: &str) -> Option<PathBuf> {
        self.artifacts_dir(run_id).ok()
    }
}

type Segment = Arc<Mutex<Vec<RunEvent>>>;

/// In-memory run journal; clones share storage
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    runs: Arc<Mutex<HashMap<String, Vec<Segment>>>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments opened for a run
    pub fn segment_count(&self, run_id: &str) -> usize {
        lock(&self.runs).get(run_id).map_or(0, Vec::len)
    }

    /// Events of a single segment
    pub fn segment(&self, run_id: &str, index: usize) -> Vec<RunEvent> {
        let runs = lock(&self.runs);
        runs.get(run_id)
            .and_then(|segments| segments.get(index))
            .map(|segment| lock(segment).clone())
            .unwrap_or_default()
    }

    /// Identifiers of every run in the journal
    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.runs).keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl RunJournal for MemoryJournal {
    fn open_segment(&self, run_id: &str) -> Result<Box<dyn EventSink>> {
        let segment: Segment = Arc::default();
        lock(&self.runs)
            .entry(run_id.to_string())
            .or_default()
            .push(segment.clone());
        Ok(Box::new(MemoryEventSink::with_buffer(segment)))
    }

    fn load_events(&self, run_id: &str) -> Result<Vec<RunEvent>> {
        let runs = lock(&self.runs);
        let events = runs
            .get(run_id)
            .map(|segments| {
                segments
                    .iter()
                    .flat_map(|segment| lock(segment).clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(events)
    }
}
