pub mod event;
mod journal;
mod replay;
pub mod sink;

pub use event::{
    ErrorCode, EventData, EventDraft, EventError, EventType, RunEvent, Sequence, API_VERSION,
    EVENT_KIND,
};
pub use journal::{MemoryJournal, RunJournal, RunStore, RunSummary};
pub use replay::{RunLog, RunState};
pub use sink::{EventRecorder, EventSink, JsonlEventSink, MemoryEventSink, ScopedSink};
