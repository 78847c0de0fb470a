//! Per-axis motion control
//!
//! An [`AxisController`] owns one servo through an [`AxisDrive`] and runs
//! the axis' homing sequencer and torque feed controller as sub-state
//! machines. Everything advances from `update()`.

pub mod controller;
pub mod drive;
pub mod homing;

pub use controller::{AxisController, AxisError, AxisStatus};
pub use drive::AxisDrive;
pub use homing::{HomingFailure, HomingOutcome, HomingSequencer, HomingState};
