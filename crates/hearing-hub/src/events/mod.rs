//! Callback event pipeline: classify, guard, commit, dispatch.

pub mod callback;
pub mod guard;
pub mod processor;

pub use callback::{classify, CallbackEvent, CallbackEventRequest, ClassifyError, EventKind, EventType};
pub use guard::{GuardError, StateChange, UnexpectedEventOrder};
pub use processor::{CallbackOutcome, EventProcessor};
