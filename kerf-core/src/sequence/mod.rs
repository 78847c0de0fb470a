//! Batch cut sequencing
//!
//! Walks the fence through a list of cut positions and the table through
//! retract, approach, torque-fed cut and retract for each of them. Progress
//! is persisted after every completed cut so a batch can resume after a
//! power loss.

pub mod controller;
pub mod progress;
pub mod state;

pub use controller::{
    BatchState, CutSequenceController, SequenceError, SequenceIo, MAX_CUT_POSITIONS,
};
pub use progress::{ProgressRecord, PROGRESS_MAGIC, PROGRESS_VERSION, MAX_PROGRESS_RECORD_SIZE};
pub use state::{SequenceEvent, SequenceState};
