//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod buttons;
pub mod control;
pub mod encoder;
pub mod hlfb;
pub mod persist;
pub mod tick;

pub use buttons::{buttons_task, PanelButtons};
pub use control::control_task;
pub use encoder::encoder_task;
pub use hlfb::hlfb_task;
pub use persist::persist_task;
pub use tick::tick_task;
