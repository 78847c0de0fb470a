//! Board-agnostic core logic for the cut-off saw controller
//!
//! This crate contains all motion and sequencing logic that does not
//! depend on specific hardware implementations:
//!
//! - Hardware abstraction traits (servo, spindle, progress store, encoder)
//! - Per-axis homing and move state machines
//! - Torque-regulated cutting feed
//! - Batch cut sequencing with power-loss-safe progress
//! - Automatic and semi-automatic cut cycles
//! - Safety interlock and encoder position cross-check
//! - The `Machine` tick orchestrator tying it all together
//!
//! Everything runs inside one cooperative polling loop: every `update()`
//! or `tick()` call does a bounded amount of work and returns.

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod axis;
pub mod clock;
pub mod config;
pub mod cycle;
pub mod feed;
pub mod machine;
pub mod motion;
pub mod safety;
pub mod sequence;
pub mod traits;

#[cfg(test)]
mod testing;

pub use machine::{Machine, MachineError, MachineParts, MachineStatus};
