//! Safety interlock
//!
//! Watches the emergency-stop chain and owns the safety relay. The chain
//! input reads high while the machine is safe; a low level is a trip.

use kerf_hal::gpio::{InputPin, OutputPin};

use crate::config::SafetyConfig;
use crate::traits::SpindleDriver;

/// Result of one interlock poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterlockEvent {
    None,
    /// Chain opened: relay dropped, spindle stopped
    Tripped,
    /// Chain closed again, relay stays down until reset
    Released,
    /// Relay re-energized
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SafetyError {
    /// Reset refused while the chain is open
    StillTripped,
}

pub struct SafetyInterlock<I, O> {
    input: I,
    relay: O,
    auto_reset: bool,
    tripped: bool,
    pending_reset: bool,
    trip_count: u32,
}

impl<I: InputPin, O: OutputPin> SafetyInterlock<I, O> {
    /// Take the chain input and relay output
    ///
    /// The relay starts de-energized. With auto-reset it comes up on the
    /// first poll that sees a closed chain; otherwise it waits for
    /// `request_reset()`.
    pub fn new(input: I, mut relay: O, config: &SafetyConfig) -> Self {
        relay.set_low();
        let tripped = input.is_low();
        Self {
            input,
            relay,
            auto_reset: config.auto_reset,
            tripped,
            pending_reset: config.auto_reset,
            trip_count: 0,
        }
    }

    /// Sample the chain; on a trip the spindle is stopped at once
    pub fn poll<SP: SpindleDriver>(&mut self, spindle: &mut SP) -> InterlockEvent {
        let safe = self.input.is_high();

        if !safe {
            if self.tripped {
                return InterlockEvent::None;
            }
            self.tripped = true;
            self.pending_reset = false;
            self.relay.set_low();
            spindle.emergency_stop();
            self.trip_count = self.trip_count.wrapping_add(1);
            error!("safety chain tripped ({})", self.trip_count);
            return InterlockEvent::Tripped;
        }

        let mut event = InterlockEvent::None;
        if self.tripped {
            self.tripped = false;
            if self.auto_reset {
                self.pending_reset = true;
            }
            info!("safety chain closed");
            event = InterlockEvent::Released;
        }

        if self.pending_reset {
            self.pending_reset = false;
            self.relay.set_high();
            info!("safety relay engaged");
            event = InterlockEvent::Reset;
        }
        event
    }

    /// Manual reset: engage the relay if the chain is closed
    pub fn request_reset(&mut self) -> Result<(), SafetyError> {
        if self.input.is_low() {
            warn!("safety reset refused, chain open");
            return Err(SafetyError::StillTripped);
        }
        self.tripped = false;
        self.pending_reset = false;
        self.relay.set_high();
        info!("safety relay engaged by reset");
        Ok(())
    }

    pub fn relay_engaged(&self) -> bool {
        self.relay.is_set_high()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Relay engaged and chain closed
    pub fn motion_permitted(&self) -> bool {
        self.relay_engaged() && !self.tripped
    }

    pub fn auto_reset(&self) -> bool {
        self.auto_reset
    }

    pub fn trip_count(&self) -> u32 {
        self.trip_count
    }
}
