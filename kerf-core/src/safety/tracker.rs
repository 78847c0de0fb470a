//! Fence position cross-check
//!
//! An independent encoder on the fence carriage catches lost steps and
//! slipping couplings. The tracker has no reference until the fence homes;
//! every homing run rebases it.

use crate::config::TrackerConfig;
use crate::motion::{fabs, round_steps};
use crate::traits::EncoderInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackerStatus {
    /// No homing reference yet
    Unreferenced,
    Ok,
    /// Measured position disagrees with the commanded one
    Deviation,
}

pub struct PositionTracker<E> {
    encoder: E,
    counts_per_unit: f32,
    max_deviation: f32,
    /// Encoder count at position zero
    offset: Option<i32>,
    last_deviation: f32,
}

impl<E: EncoderInput> PositionTracker<E> {
    pub fn new(encoder: E, config: &TrackerConfig) -> Self {
        Self {
            encoder,
            counts_per_unit: config.counts_per_unit,
            max_deviation: config.max_deviation,
            offset: None,
            last_deviation: 0.0,
        }
    }

    /// Declare the carriage to be at `position`
    pub fn rebase(&mut self, position: f32) {
        let count = self.encoder.count();
        self.offset = Some(count.wrapping_sub(round_steps(position * self.counts_per_unit)));
        self.last_deviation = 0.0;
        info!("tracker rebased at {} (count {})", position, count);
    }

    pub fn is_referenced(&self) -> bool {
        self.offset.is_some()
    }

    /// Encoder-derived position, once referenced
    pub fn absolute_position(&self) -> Option<f32> {
        let offset = self.offset?;
        let counts = self.encoder.count().wrapping_sub(offset);
        Some(counts as f32 / self.counts_per_unit)
    }

    /// Compare the encoder with the commanded position
    pub fn check(&mut self, commanded: f32) -> TrackerStatus {
        let Some(measured) = self.absolute_position() else {
            return TrackerStatus::Unreferenced;
        };
        self.last_deviation = fabs(measured - commanded);
        if self.last_deviation > self.max_deviation {
            TrackerStatus::Deviation
        } else {
            TrackerStatus::Ok
        }
    }

    /// Deviation seen by the last `check()`
    pub fn deviation(&self) -> f32 {
        self.last_deviation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::within;
    use crate::testing::SharedEncoder;
    use core::cell::Cell;

    fn tracker(count: &Cell<i32>) -> PositionTracker<SharedEncoder<'_>> {
        PositionTracker::new(SharedEncoder(count), &TrackerConfig::default())
    }

    #[test]
    fn test_unreferenced_until_rebase() {
        let count = Cell::new(1234);
        let mut tracker = tracker(&count);
        assert_eq!(tracker.check(5.0), TrackerStatus::Unreferenced);
        assert_eq!(tracker.absolute_position(), None);

        tracker.rebase(0.0);
        assert!(tracker.is_referenced());
        assert_eq!(tracker.absolute_position(), Some(0.0));
    }

    #[test]
    fn test_tracks_encoder_motion() {
        let count = Cell::new(-500);
        let mut tracker = tracker(&count);
        tracker.rebase(1.0);
        // 2000 counts per inch
        count.set(-500 + 4_000);
        let measured = tracker.absolute_position().unwrap();
        assert!(within(measured, 3.0, 1e-4));
        assert_eq!(tracker.check(3.0), TrackerStatus::Ok);
        assert_eq!(tracker.check(3.01), TrackerStatus::Ok);
    }

    #[test]
    fn test_deviation_beyond_limit() {
        let count = Cell::new(0);
        let mut tracker = tracker(&count);
        tracker.rebase(0.0);
        count.set(10_000);
        assert_eq!(tracker.check(4.9), TrackerStatus::Deviation);
        assert!(within(tracker.deviation(), 0.1, 1e-4));

        tracker.rebase(5.0);
        assert_eq!(tracker.check(5.0), TrackerStatus::Ok);
    }
}
