//! RP2040-specific HAL for the saw controller firmware
//!
//! This crate provides RP2040 implementations of the shared `kerf-hal`
//! traits:
//!
//! - PIO-based step pulse generation (implements `kerf_hal::StepOutput`)
//! - Flash storage driver (implements `kerf_hal::FlashStorage`)
//! - Embassy GPIO adapters for the pin traits

#![no_std]

pub mod flash;
pub mod gpio;
pub mod pio;
pub mod stepper;

pub use flash::Rp2040FlashStorage;
pub use gpio::{RpInput, RpOutput};
pub use kerf_hal::{FlashStorage as FlashStorageTrait, StorageKey};
pub use stepper::PioStepper;
