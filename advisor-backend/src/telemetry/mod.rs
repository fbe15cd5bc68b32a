//! Turn recording and execution traces.
//!
//! Every runner invocation happens inside a `RecordingScope`; the manager
//! agent reports its steps and delegations as spans into the scope's
//! collector, feedback judges add their scores, and everything is persisted
//! when the scope closes.

pub mod feedback;
pub mod recorder;
pub mod span;
pub mod store;

pub use feedback::FeedbackEmitter;
pub use recorder::{Recorder, RecordingScope, TurnRecord, TurnStatus};
pub use span::{Span, SpanCollector, SpanGuard, SpanStatus, SpanType};
pub use store::{RetentionPolicy, TelemetryStore};
