//! Torque-regulated cutting feed
//!
//! Drives an axis toward a target at whatever speed keeps the measured
//! servo torque near a setpoint, then retracts to where it started.

pub mod controller;
pub mod filter;
pub mod pid;

pub use controller::{
    FeedDiagnostics, FeedError, FeedState, TorqueFeedController, ACCEL_FACTOR_RANGE,
    TORQUE_TARGET_RANGE,
};
pub use filter::{TorqueFilter, TORQUE_BIN_CAPACITY};
pub use pid::{Pid, PidCoefficients};
