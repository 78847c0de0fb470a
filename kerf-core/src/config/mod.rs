//! Configuration types
//!
//! Board-agnostic configuration structures. The firmware stores
//! `MachineConfig` in flash as postcard binary data and falls back to the
//! defaults below when nothing valid is stored.

pub mod types;

pub use types::*;
