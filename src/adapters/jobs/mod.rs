//! Job dispatch adapters.

pub mod in_process;
pub mod recording;

pub use in_process::{InProcessDispatcher, JobReceiver};
pub use recording::{DispatchedJob, RecordingDispatcher};
