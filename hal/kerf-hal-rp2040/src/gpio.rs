//! Embassy pin adapters
//!
//! Wrap `embassy_rp` pins so the core crates can use them through the
//! `kerf-hal` pin traits.

use embassy_rp::gpio::{Input, Output};

/// Input pin adapter
pub struct RpInput<'d>(pub Input<'d>);

impl kerf_hal::InputPin for RpInput<'_> {
    fn is_high(&self) -> bool {
        self.0.is_high()
    }
}

/// Output pin adapter
pub struct RpOutput<'d>(pub Output<'d>);

impl kerf_hal::OutputPin for RpOutput<'_> {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }

    fn is_set_high(&self) -> bool {
        self.0.is_set_high()
    }
}
