//! Recording orchestration against the external recorder
//!
//! [`RecordingOrchestrator`] owns the session state machine around a capture;
//! the `recovery` module finds the recorder's output file once it stops.

mod orchestrator;
mod recovery;

pub use orchestrator::{RecordingOrchestrator, StartOutcome, StopOutcome};
