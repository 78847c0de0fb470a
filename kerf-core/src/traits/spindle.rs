//! Spindle driver trait
//!
//! The saw blade motor. Implementations are typically a contactor driven
//! through a relay, so they are on/off only.

/// Errors that can occur with spindle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpindleError {
    /// Driver is disabled
    Disabled,
    /// Safety interlock prevented the start
    Interlock,
    /// Contactor was switched again before its minimum switch interval
    SwitchTooFast,
}

/// Trait for spindle drivers
pub trait SpindleDriver {
    /// Start the spindle
    fn start(&mut self) -> Result<(), SpindleError>;

    /// Stop the spindle normally
    fn stop(&mut self);

    /// Stop the spindle immediately, bypassing any switch timing
    fn emergency_stop(&mut self);

    /// Check if the spindle is running
    fn is_running(&self) -> bool;

    /// Advance internal timers (called once per tick)
    fn update(&mut self, _now_ms: u32) {}
}
