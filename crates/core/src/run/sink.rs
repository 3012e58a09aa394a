//! Event sinks
//!
//! A sink is the single source of truth for a run: every event goes through
//! exactly one sink, which appends it durably before `emit` returns. A sink
//! is owned by one run at a time and written through `&mut`, so emission
//! within a run is serialized by construction.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use super::event::{EventDraft, RunEvent, Sequence};
use crate::{Error, Result};

/// Durable, ordered, append-only destination for run events
pub trait EventSink: Send {
    /// Append one event; returns only after the event is durable
    fn emit(&mut self, event: &RunEvent) -> Result<()>;

    /// Force any buffered data to storage
    fn flush(&mut self) -> Result<()>;

    /// Release the underlying resource; later emits fail
    fn close(&mut self) -> Result<()>;
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: &RunEvent) -> Result<()> {
        (**self).emit(event)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Writes events as newline-delimited JSON
pub struct JsonlEventSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    event_count: u64,
}

impl JsonlEventSink {
    /// Open `path` for appending, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), OpenOptions::new().create(true).append(true))
    }

    /// Open a log that must not exist yet; fails if another writer got there first
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), OpenOptions::new().create_new(true).append(true))
    }

    fn open_with(path: &Path, options: &OpenOptions) -> Result<Self> {
        let path = path.to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = options.open(&path)?;
        debug!("Opened event log: {}", path.display());

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            event_count: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events written through this sink
    pub fn event_count(&self) -> u64 {
        self.event_count
    }
}

impl EventSink for JsonlEventSink {
    fn emit(&mut self, event: &RunEvent) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::SinkClosed)?;
        let json = serde_json::to_string(event)?;

        writeln!(writer, "{}", json)?;
        writer.flush()?;

        self.event_count += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer.flush()?),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            debug!(
                "Closed event log {} after {} events",
                self.path.display(),
                self.event_count
            );
        }
        Ok(())
    }
}

/// In-memory sink; clones share the same event buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<RunEvent>>>,
    closed: bool,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sink that appends into an existing shared buffer
    pub fn with_buffer(events: Arc<Mutex<Vec<RunEvent>>>) -> Self {
        Self {
            events,
            closed: false,
        }
    }

    /// Snapshot of every event emitted so far
    pub fn events(&self) -> Vec<RunEvent> {
        lock(&self.events).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&mut self, event: &RunEvent) -> Result<()> {
        if self.closed {
            return Err(Error::SinkClosed);
        }
        lock(&self.events).push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave a half-written event behind.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scoped ownership of a run's sink
///
/// `finish` flushes and closes the sink and reports failures. If the guard
/// is dropped without `finish` (early return, panic) the sink is still
/// closed, and failures are logged.
pub struct ScopedSink<S: EventSink> {
    inner: S,
    finished: bool,
}

impl<S: EventSink> ScopedSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    /// Flush and close the sink
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        let flushed = self.inner.flush();
        let closed = self.inner.close();
        flushed.and(closed)
    }
}

impl<S: EventSink> Deref for ScopedSink<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.inner
    }
}

impl<S: EventSink> DerefMut for ScopedSink<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: EventSink> Drop for ScopedSink<S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.inner.flush().and_then(|_| self.inner.close()) {
            warn!("Failed to close event sink on unwind: {}", e);
        }
    }
}

/// Emits events for one run
///
/// The recorder knows which run and agent it writes for, but not where the
/// run is in its sequence: callers pass the current [`Sequence`] and get the
/// next one back.
pub struct EventRecorder<'a> {
    sink: &'a mut dyn EventSink,
    run_id: &'a str,
    agent_name: &'a str,
}

impl<'a> EventRecorder<'a> {
    pub fn new(sink: &'a mut dyn EventSink, run_id: &'a str, agent_name: &'a str) -> Self {
        Self {
            sink,
            run_id,
            agent_name,
        }
    }

    pub fn run_id(&self) -> &str {
        self.run_id
    }

    pub fn agent_name(&self) -> &str {
        self.agent_name
    }

    /// Emit `draft` as event number `seq` and return the following number
    pub fn record(&mut self, seq: Sequence, draft: EventDraft) -> Result<Sequence> {
        let event = RunEvent::from_draft(self.run_id, self.agent_name, seq, draft);
        self.sink.emit(&event)?;
        Ok(seq.next())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }
}
