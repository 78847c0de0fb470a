//! Spindle driver implementations

pub mod relay;

pub use relay::{RelaySpindle, RelaySpindleConfig, RelayState};
