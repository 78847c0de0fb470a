//! Hardware abstraction traits
//!
//! These traits define the interface between the motion logic and the
//! hardware-specific drivers. Controllers own or borrow implementors; no
//! driver is ever reached through a global.

pub mod encoder;
pub mod servo;
pub mod spindle;
pub mod storage;

pub use encoder::EncoderInput;
pub use servo::{ServoAlerts, ServoDriver};
pub use spindle::{SpindleDriver, SpindleError};
pub use storage::{ProgressStore, StoreError};
