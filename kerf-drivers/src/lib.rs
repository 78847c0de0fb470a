//! Hardware driver implementations
//!
//! This crate provides concrete implementations of the traits defined
//! in kerf-core for the saw's hardware:
//!
//! - Servos (step/direction closed-loop drives with HLFB feedback)
//! - Spindle (relay-switched contactor)
//! - Fence encoder (polled quadrature decoding)
//! - Progress storage (RAM mirror committed to flash by the firmware)

#![no_std]
#![deny(unsafe_code)]

pub mod encoder;
pub mod servo;
pub mod spindle;
pub mod storage;

pub use encoder::{QuadratureEncoder, SharedCount};
pub use servo::StepDirServo;
pub use spindle::{RelaySpindle, RelaySpindleConfig};
pub use storage::{decode_record, encode_record, MirroredProgress, PendingWrite};
