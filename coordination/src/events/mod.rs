//! Progress events for pipeline runs
//!
//! 1. **Event Types** (`types.rs`): the event vocabulary a run emits, from
//!    stage boundaries to the terminal result or error.
//!
//! 2. **Progress Sink** (`sink.rs`): non-blocking producer handle over an
//!    unbounded channel, ordered per run.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│ ProgressSink │────▶│   Consumer   │
//! │   (emit)     │     │   (mpsc)     │     │ (JSON lines) │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod sink;
pub mod types;

pub use sink::{ProgressReceiver, ProgressSink};
pub use types::{EventEnvelope, PipelineEvent};
