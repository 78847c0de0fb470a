//! Hard-stop homing
//!
//! The axis runs toward its mechanical stop, first fast then slow, and the
//! servo's feedback output reports contact. After backing off a fixed
//! distance the commanded position is redefined as zero.
//!
//! ```text
//! FastApproach ──(feedback | time)──► Dwell ──► SlowApproach ──► WaitForStop
//!                                                                    │ feedback
//!                   Idle ◄── Finalize ◄── Backoff ◄──────────────────┘
//! ```
//!
//! Any state can drop to `Failed` on the overall timeout or a servo fault.

use crate::config::HomingConfig;
use crate::traits::ServoDriver;

use super::drive::AxisDrive;

/// Homing sequencer states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingState {
    Idle,
    FastApproach,
    Dwell,
    SlowApproach,
    WaitForStop,
    Backoff,
    Finalize,
    Failed,
}

/// Why homing gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingFailure {
    /// Overall time limit exceeded
    Timeout,
    /// Servo raised a fault alert
    Fault,
}

/// Result of one `process()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomingOutcome {
    /// Not homing
    Idle,
    /// Still in progress
    Busy,
    /// Finished this call, position is now referenced
    Homed,
    /// Failed this call
    Failed(HomingFailure),
}

#[derive(Debug, Clone)]
pub struct HomingSequencer {
    config: HomingConfig,
    state: HomingState,
    started_ms: u32,
    entered_ms: u32,
}

impl HomingSequencer {
    pub fn new(config: HomingConfig) -> Self {
        Self {
            config,
            state: HomingState::Idle,
            started_ms: 0,
            entered_ms: 0,
        }
    }

    pub fn state(&self) -> HomingState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, HomingState::Idle | HomingState::Failed)
    }

    fn toward(&self) -> i32 {
        if self.config.toward_positive {
            1
        } else {
            -1
        }
    }

    fn enter(&mut self, state: HomingState, now_ms: u32) {
        trace!("homing {} -> {}", self.state, state);
        self.state = state;
        self.entered_ms = now_ms;
    }

    /// Begin homing from any position
    pub fn start<D: ServoDriver>(&mut self, drive: &mut AxisDrive<D>, now_ms: u32) {
        self.started_ms = now_ms;
        self.enter(HomingState::FastApproach, now_ms);
        let velocity = self.toward() * self.config.fast_velocity_sps as i32;
        drive.driver_mut().move_velocity(velocity);
    }

    /// Drop back to idle without touching the drive
    pub fn abort(&mut self) {
        if self.is_active() {
            debug!("homing aborted in {}", self.state);
        }
        self.state = HomingState::Idle;
    }

    fn fail<D: ServoDriver>(
        &mut self,
        drive: &mut AxisDrive<D>,
        failure: HomingFailure,
        now_ms: u32,
    ) -> HomingOutcome {
        drive.driver_mut().stop_abrupt();
        warn!("homing failed in {}: {}", self.state, failure);
        self.enter(HomingState::Failed, now_ms);
        HomingOutcome::Failed(failure)
    }

    /// Advance by at most one transition
    pub fn process<D: ServoDriver>(&mut self, drive: &mut AxisDrive<D>, now_ms: u32) -> HomingOutcome {
        if !self.is_active() {
            return HomingOutcome::Idle;
        }
        if now_ms.wrapping_sub(self.started_ms) >= self.config.timeout_ms {
            return self.fail(drive, HomingFailure::Timeout, now_ms);
        }
        if drive.driver().alerts().motor_faulted {
            return self.fail(drive, HomingFailure::Fault, now_ms);
        }

        let in_state = now_ms.wrapping_sub(self.entered_ms);
        match self.state {
            HomingState::FastApproach => {
                if drive.driver().feedback_asserted() || in_state >= self.config.fast_approach_ms {
                    drive.driver_mut().stop_decelerate();
                    self.enter(HomingState::Dwell, now_ms);
                }
            }
            HomingState::Dwell => {
                if in_state >= self.config.dwell_ms && drive.driver().steps_complete() {
                    self.enter(HomingState::SlowApproach, now_ms);
                }
            }
            HomingState::SlowApproach => {
                let velocity = self.toward() * self.config.slow_velocity_sps as i32;
                drive.driver_mut().move_velocity(velocity);
                self.enter(HomingState::WaitForStop, now_ms);
            }
            HomingState::WaitForStop => {
                if drive.driver().feedback_asserted() {
                    let driver = drive.driver_mut();
                    driver.stop_abrupt();
                    driver.set_max_velocity(self.config.slow_velocity_sps);
                    driver.move_relative(-self.toward() * self.config.backoff_steps as i32);
                    self.enter(HomingState::Backoff, now_ms);
                }
            }
            HomingState::Backoff => {
                if drive.driver().steps_complete() {
                    self.enter(HomingState::Finalize, now_ms);
                }
            }
            HomingState::Finalize => {
                drive.driver_mut().set_position_reference(0);
                self.enter(HomingState::Idle, now_ms);
                return HomingOutcome::Homed;
            }
            HomingState::Idle | HomingState::Failed => return HomingOutcome::Idle,
        }
        HomingOutcome::Busy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisConfig;
    use crate::traits::ServoAlerts;
    use crate::testing::SimServo;

    fn setup(servo: SimServo) -> (AxisDrive<SimServo>, HomingSequencer) {
        let config = AxisConfig::fence();
        let mut drive = AxisDrive::new(servo, &config);
        drive.driver_mut().enable(true);
        drive.apply_limits();
        (drive, HomingSequencer::new(config.homing))
    }

    fn run(
        drive: &mut AxisDrive<SimServo>,
        homing: &mut HomingSequencer,
        now: &mut u32,
        limit_ms: u32,
    ) -> HomingOutcome {
        let end = *now + limit_ms;
        while *now < end {
            drive.driver_mut().advance(10);
            *now += 10;
            match homing.process(drive, *now) {
                HomingOutcome::Busy => {}
                outcome => return outcome,
            }
        }
        HomingOutcome::Busy
    }

    #[test]
    fn test_homes_against_hard_stop() {
        let (mut drive, mut homing) = setup(SimServo::with_hard_stop(-12_000));
        let mut now = 0;
        homing.start(&mut drive, now);
        assert_eq!(homing.state(), HomingState::FastApproach);
        assert_eq!(drive.driver().velocity(), -8_000);

        let outcome = run(&mut drive, &mut homing, &mut now, 10_000);
        assert_eq!(outcome, HomingOutcome::Homed);
        assert_eq!(homing.state(), HomingState::Idle);
        assert_eq!(drive.driver().commanded_position(), 0);
        // Backed off 400 steps from the stop before zeroing
        assert_eq!(drive.driver().hard_stop, Some(-400));
    }

    #[test]
    fn test_fast_approach_times_out_into_slow_approach() {
        // Stop is far away: fast approach ends on time, slow approach finds it
        let (mut drive, mut homing) = setup(SimServo::with_hard_stop(-40_000));
        let mut now = 0;
        homing.start(&mut drive, now);
        while homing.state() == HomingState::FastApproach {
            drive.driver_mut().advance(10);
            now += 10;
            homing.process(&mut drive, now);
        }
        assert_eq!(homing.state(), HomingState::Dwell);
        assert!(now >= 4_000);
        assert_eq!(run(&mut drive, &mut homing, &mut now, 20_000), HomingOutcome::Homed);
    }

    #[test]
    fn test_timeout_fails_and_stops() {
        // No hard stop: feedback never asserts
        let (mut drive, mut homing) = setup(SimServo::new());
        let mut now = 0;
        homing.start(&mut drive, now);
        let outcome = run(&mut drive, &mut homing, &mut now, 40_000);
        assert_eq!(outcome, HomingOutcome::Failed(HomingFailure::Timeout));
        assert_eq!(homing.state(), HomingState::Failed);
        assert!(!homing.is_active());
        assert!(drive.driver().steps_complete());
        assert_eq!(drive.driver().abrupt_stops, 1);
    }

    #[test]
    fn test_fault_alert_fails() {
        let (mut drive, mut homing) = setup(SimServo::with_hard_stop(-12_000));
        let mut now = 0;
        homing.start(&mut drive, now);
        drive.driver_mut().alerts = ServoAlerts {
            motor_faulted: true,
            ..ServoAlerts::NONE
        };
        let outcome = run(&mut drive, &mut homing, &mut now, 100);
        assert_eq!(outcome, HomingOutcome::Failed(HomingFailure::Fault));
    }

    #[test]
    fn test_one_transition_per_call() {
        let (mut drive, mut homing) = setup(SimServo::new());
        homing.start(&mut drive, 0);
        drive.driver_mut().feedback = true;
        homing.process(&mut drive, 10);
        assert_eq!(homing.state(), HomingState::Dwell);
        homing.process(&mut drive, 20);
        // Dwell has not elapsed yet
        assert_eq!(homing.state(), HomingState::Dwell);
        homing.process(&mut drive, 300);
        assert_eq!(homing.state(), HomingState::SlowApproach);
        homing.process(&mut drive, 310);
        assert_eq!(homing.state(), HomingState::WaitForStop);
        homing.process(&mut drive, 320);
        assert_eq!(homing.state(), HomingState::Backoff);
    }

    #[test]
    fn test_abort_returns_to_idle() {
        let (mut drive, mut homing) = setup(SimServo::new());
        homing.start(&mut drive, 0);
        homing.abort();
        assert_eq!(homing.state(), HomingState::Idle);
        assert_eq!(homing.process(&mut drive, 10), HomingOutcome::Idle);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_homing_always_terminates(
                hard_stop in proptest::option::of(-60_000i32..-100),
                step_ms in 5u32..60,
            ) {
                let servo = match hard_stop {
                    Some(position) => SimServo::with_hard_stop(position),
                    None => SimServo::new(),
                };
                let (mut drive, mut homing) = setup(servo);
                let timeout_ms = AxisConfig::fence().homing.timeout_ms;
                homing.start(&mut drive, 0);

                let mut now = 0u32;
                let outcome = loop {
                    drive.driver_mut().advance(step_ms);
                    now += step_ms;
                    match homing.process(&mut drive, now) {
                        HomingOutcome::Busy => {}
                        outcome => break outcome,
                    }
                    prop_assert!(now <= timeout_ms + step_ms);
                };

                prop_assert!(matches!(outcome, HomingOutcome::Homed | HomingOutcome::Failed(_)));
                prop_assert!(!homing.is_active());
            }
        }
    }
}
