//! Relay-driven spindle
//!
//! The saw blade motor runs from a contactor switched by a relay output.
//! This driver provides:
//! - On/off control through any [`OutputPin`] (wrap active-low outputs in
//!   [`kerf_hal::gpio::Inverted`])
//! - Minimum switch interval to protect the contactor from chatter
//! - Emergency stop that drops the relay regardless of the interval
//!
//! # Usage
//!
//! ```ignore
//! let mut spindle = RelaySpindle::new(contactor_pin, RelaySpindleConfig::default());
//! spindle.set_enabled(true);
//! spindle.start()?;
//!
//! // Every control tick:
//! spindle.update(now_ms);
//! ```

use kerf_core::clock;
use kerf_core::traits::{SpindleDriver, SpindleError};
use kerf_hal::gpio::OutputPin;

/// Relay spindle configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RelaySpindleConfig {
    /// Minimum time between relay switches (ms)
    pub min_switch_delay_ms: u32,
}

impl Default for RelaySpindleConfig {
    fn default() -> Self {
        Self::contactor()
    }
}

impl RelaySpindleConfig {
    /// Mechanical contactor, slow switching
    pub fn contactor() -> Self {
        Self {
            min_switch_delay_ms: 100,
        }
    }

    /// Solid state relay
    pub fn ssr() -> Self {
        Self {
            min_switch_delay_ms: 10,
        }
    }
}

/// Relay state as seen from the contactor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RelayState {
    Off,
    /// Relay just switched, contact still settling
    SwitchDelay,
    On,
}

/// Spindle behind a relay-switched contactor
pub struct RelaySpindle<P> {
    relay: P,
    config: RelaySpindleConfig,
    enabled: bool,
    state: RelayState,
    relay_active: bool,
    now_ms: u32,
    /// Time of the last relay switch, `None` until the first one
    last_switch_ms: Option<u32>,
}

impl<P: OutputPin> RelaySpindle<P> {
    /// Create a disabled spindle with the relay released
    pub fn new(mut relay: P, config: RelaySpindleConfig) -> Self {
        relay.set_low();
        Self {
            relay,
            config,
            enabled: false,
            state: RelayState::Off,
            relay_active: false,
            now_ms: 0,
            last_switch_ms: None,
        }
    }

    pub fn config(&self) -> &RelaySpindleConfig {
        &self.config
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn relay(&self) -> &P {
        &self.relay
    }

    /// Allow or forbid starting; disabling releases the relay
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled && self.relay_active {
            self.switch_relay(false);
            self.state = RelayState::SwitchDelay;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check if the switch interval since the last relay change has passed
    pub fn can_switch(&self) -> bool {
        match self.last_switch_ms {
            Some(at) => clock::since(self.now_ms, at) >= self.config.min_switch_delay_ms,
            None => true,
        }
    }

    fn switch_relay(&mut self, active: bool) {
        if self.relay_active != active {
            self.relay_active = active;
            self.relay.set_state(active);
            self.last_switch_ms = Some(self.now_ms);
        }
    }
}

impl<P: OutputPin> SpindleDriver for RelaySpindle<P> {
    fn start(&mut self) -> Result<(), SpindleError> {
        if !self.enabled {
            return Err(SpindleError::Disabled);
        }
        if self.relay_active {
            return Ok(());
        }
        if !self.can_switch() {
            return Err(SpindleError::SwitchTooFast);
        }
        self.switch_relay(true);
        self.state = RelayState::SwitchDelay;
        Ok(())
    }

    fn stop(&mut self) {
        if self.relay_active {
            self.switch_relay(false);
            self.state = RelayState::SwitchDelay;
        }
    }

    fn emergency_stop(&mut self) {
        self.relay_active = false;
        self.relay.set_low();
        self.last_switch_ms = Some(self.now_ms);
        self.state = RelayState::Off;
    }

    fn is_running(&self) -> bool {
        self.relay_active
    }

    fn update(&mut self, now_ms: u32) {
        self.now_ms = now_ms;
        if self.state == RelayState::SwitchDelay && self.can_switch() {
            self.state = if self.relay_active {
                RelayState::On
            } else {
                RelayState::Off
            };
        }
    }
}
