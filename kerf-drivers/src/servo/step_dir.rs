//! Step/direction servo driver
//!
//! Drives a closed-loop servo (ClearPath style) through a step pulse
//! generator. The drive closes its own position loop; this side only
//! plans the commanded step stream and keeps the commanded position.
//!
//! # Feedback
//!
//! The drive's high-level feedback output (HLFB) is read as a digital
//! input: asserted when the configured torque threshold is exceeded, which
//! is how homing finds the hard stop. When the board can also measure the
//! HLFB duty cycle, the measured torque is pushed in with
//! [`StepDirServo::set_measured_torque`].
//!
//! # Usage
//!
//! ```ignore
//! let mut servo = StepDirServo::new(pio_stepper, hlfb_pin);
//! servo.enable(true);
//! servo.move_absolute(4000);
//!
//! // Once per control tick:
//! servo.update(1);
//! ```

use kerf_core::motion::{fabs, round_steps};
use kerf_core::traits::{ServoAlerts, ServoDriver};
use kerf_hal::gpio::InputPin;
use kerf_hal::step::StepOutput;

use super::profile::TrapezoidProfile;

/// What the profile is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServoMotion {
    Idle,
    /// Positional move to an absolute step target
    Position(i32),
    /// Continuous run at a signed step rate
    Velocity(i32),
    /// Ramping down to rest
    Stopping,
}

/// Convert a HLFB PWM duty cycle (0.0 to 1.0) to a torque percentage
///
/// The drive reports 0% torque at 50% duty and full scale at the 5% / 95%
/// ends. The sign is dropped; callers regulate magnitude.
pub fn torque_from_duty(duty: f32) -> f32 {
    let duty = duty.clamp(0.05, 0.95);
    (fabs(duty - 0.5) / 0.45 * 100.0).min(100.0)
}

/// Step/direction servo with a software trapezoidal profile
pub struct StepDirServo<O, F> {
    output: O,
    feedback: F,
    profile: TrapezoidProfile,
    motion: ServoMotion,
    enabled: bool,
    forward: bool,
    rate: u32,
    measured_torque: Option<f32>,
    alerts: ServoAlerts,
    /// Drive was disabled since the last alert clear
    power_cycled: bool,
}

impl<O: StepOutput, F: InputPin> StepDirServo<O, F> {
    pub fn new(mut output: O, feedback: F) -> Self {
        output.set_enabled(false);
        output.set_rate(0);
        output.set_direction(true);
        Self {
            output,
            feedback,
            profile: TrapezoidProfile::new(),
            motion: ServoMotion::Idle,
            enabled: false,
            forward: true,
            rate: 0,
            measured_torque: None,
            alerts: ServoAlerts::NONE,
            power_cycled: false,
        }
    }

    /// Advance the profile by `delta_ms` and retune the pulse generator
    pub fn update(&mut self, delta_ms: u32) {
        if !self.enabled {
            return;
        }

        match self.motion {
            ServoMotion::Idle => {}
            ServoMotion::Position(target) => {
                if self.profile.advance_to(target as f32, delta_ms) {
                    self.motion = ServoMotion::Idle;
                }
            }
            ServoMotion::Velocity(velocity) => {
                self.profile.advance_velocity(velocity as f32, delta_ms);
            }
            ServoMotion::Stopping => {
                if self.profile.advance_stop(delta_ms) {
                    self.motion = ServoMotion::Idle;
                }
            }
        }

        self.apply_rate();
    }

    /// Record a torque reading, `None` when the measurement is unavailable
    pub fn set_measured_torque(&mut self, percent: Option<f32>) {
        self.measured_torque = percent.map(|p| p.clamp(0.0, 100.0));
    }

    /// Latch alerts raised outside the step stream (fault input, watchdog)
    pub fn latch_alerts(&mut self, alerts: ServoAlerts) {
        self.alerts.motor_faulted |= alerts.motor_faulted;
        self.alerts.enable_not_ready |= alerts.enable_not_ready;
        self.alerts.move_canceled |= alerts.move_canceled;
        self.alerts.following_error |= alerts.following_error;
        if alerts.any() {
            self.profile.halt();
            self.motion = ServoMotion::Idle;
            self.apply_rate();
        }
    }

    pub fn motion(&self) -> ServoMotion {
        self.motion
    }

    /// Signed profile velocity in steps/s
    pub fn velocity(&self) -> f32 {
        self.profile.velocity()
    }

    /// Rate currently programmed into the pulse generator
    pub fn output_rate(&self) -> u32 {
        self.rate
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    fn start(&mut self, motion: ServoMotion) {
        if !self.enabled {
            self.alerts.move_canceled = true;
            return;
        }
        self.motion = motion;
    }

    fn apply_rate(&mut self) {
        let velocity = self.profile.velocity();
        let forward = velocity >= 0.0;
        if forward != self.forward {
            self.forward = forward;
            self.output.set_direction(forward);
        }
        let rate = (round_steps(fabs(velocity)).max(0) as u32).min(self.output.max_rate());
        if rate != self.rate {
            self.rate = rate;
            self.output.set_rate(rate);
        }
    }
}

impl<O: StepOutput, F: InputPin> ServoDriver for StepDirServo<O, F> {
    fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.output.set_enabled(enabled);
        if !enabled {
            self.profile.halt();
            self.motion = ServoMotion::Idle;
            self.power_cycled = true;
            self.rate = 0;
            self.output.set_rate(0);
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_max_velocity(&mut self, steps_per_s: u32) {
        self.profile.set_max_velocity(steps_per_s);
    }

    fn set_max_acceleration(&mut self, steps_per_s2: u32) {
        self.profile.set_acceleration(steps_per_s2);
    }

    fn move_absolute(&mut self, position: i32) {
        self.start(ServoMotion::Position(position));
    }

    fn move_relative(&mut self, delta: i32) {
        let base = self.commanded_position();
        self.start(ServoMotion::Position(base.saturating_add(delta)));
    }

    fn move_velocity(&mut self, steps_per_s: i32) {
        self.start(ServoMotion::Velocity(steps_per_s));
    }

    fn stop_decelerate(&mut self) {
        if self.motion != ServoMotion::Idle {
            self.motion = ServoMotion::Stopping;
        }
    }

    fn stop_abrupt(&mut self) {
        self.profile.halt();
        self.motion = ServoMotion::Idle;
        self.apply_rate();
    }

    fn steps_complete(&self) -> bool {
        self.motion == ServoMotion::Idle
    }

    fn commanded_position(&self) -> i32 {
        round_steps(self.profile.position())
    }

    fn set_position_reference(&mut self, position: i32) {
        self.profile.set_position(position as f32);
        if let ServoMotion::Position(_) = self.motion {
            self.motion = ServoMotion::Stopping;
        }
    }

    fn feedback_asserted(&self) -> bool {
        self.enabled && self.feedback.is_high()
    }

    fn feedback_percent(&self) -> Option<f32> {
        self.measured_torque
    }

    fn alerts(&self) -> ServoAlerts {
        self.alerts
    }

    fn clear_alerts(&mut self) {
        if !self.alerts.needs_enable_cycle() || self.power_cycled {
            self.alerts = ServoAlerts::NONE;
            self.power_cycled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[derive(Default)]
    struct RecordingOutput {
        rate: u32,
        forward: bool,
        enabled: bool,
        rate_changes: u32,
    }

    impl StepOutput for RecordingOutput {
        fn set_rate(&mut self, steps_per_s: u32) {
            self.rate = steps_per_s;
            self.rate_changes += 1;
        }

        fn set_direction(&mut self, forward: bool) {
            self.forward = forward;
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }

        fn max_rate(&self) -> u32 {
            50_000
        }
    }

    struct Hlfb<'a>(&'a Cell<bool>);

    impl InputPin for Hlfb<'_> {
        fn is_high(&self) -> bool {
            self.0.get()
        }
    }

    fn servo(hlfb: &Cell<bool>) -> StepDirServo<RecordingOutput, Hlfb<'_>> {
        let mut servo = StepDirServo::new(RecordingOutput::default(), Hlfb(hlfb));
        servo.set_max_velocity(4000);
        servo.set_max_acceleration(40_000);
        servo.enable(true);
        servo
    }

    fn run(servo: &mut StepDirServo<RecordingOutput, Hlfb<'_>>, ticks: u32) {
        for _ in 0..ticks {
            servo.update(1);
        }
    }

    #[test]
    fn test_absolute_move() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        assert!(servo.output().enabled);

        servo.move_absolute(2000);
        assert!(!servo.steps_complete());
        run(&mut servo, 100);
        assert!(servo.output().rate > 0);
        assert!(servo.output().forward);

        run(&mut servo, 2000);
        assert!(servo.steps_complete());
        assert_eq!(servo.commanded_position(), 2000);
        assert_eq!(servo.output().rate, 0);
    }

    #[test]
    fn test_relative_move_from_commanded_position() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        servo.move_absolute(1000);
        run(&mut servo, 2000);
        servo.move_relative(-300);
        assert_eq!(servo.motion(), ServoMotion::Position(700));
        run(&mut servo, 2000);
        assert_eq!(servo.commanded_position(), 700);
    }

    #[test]
    fn test_velocity_mode_and_decelerate() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        servo.move_velocity(-2000);
        run(&mut servo, 200);
        assert_eq!(servo.output().rate, 2000);
        assert!(!servo.output().forward);
        assert!(servo.commanded_position() < 0);

        servo.stop_decelerate();
        assert!(!servo.steps_complete());
        run(&mut servo, 100);
        assert!(servo.steps_complete());
        assert_eq!(servo.output().rate, 0);
    }

    #[test]
    fn test_abrupt_stop() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        servo.move_velocity(3000);
        run(&mut servo, 50);
        servo.stop_abrupt();
        assert!(servo.steps_complete());
        assert_eq!(servo.output().rate, 0);
        assert_eq!(servo.velocity(), 0.0);
    }

    #[test]
    fn test_velocity_limit_retunes_in_flight() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        servo.move_absolute(100_000);
        run(&mut servo, 200);
        assert_eq!(servo.output().rate, 4000);

        servo.set_max_velocity(1000);
        run(&mut servo, 200);
        assert_eq!(servo.output().rate, 1000);
    }

    #[test]
    fn test_move_while_disabled_is_canceled() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        servo.enable(false);
        servo.move_absolute(500);
        assert!(servo.steps_complete());
        assert!(servo.alerts().move_canceled);

        servo.clear_alerts();
        assert!(!servo.alerts().any());
    }

    #[test]
    fn test_fault_clears_only_after_enable_cycle() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        servo.move_velocity(1000);
        run(&mut servo, 10);
        servo.latch_alerts(ServoAlerts {
            motor_faulted: true,
            ..ServoAlerts::NONE
        });
        assert!(servo.steps_complete());

        servo.clear_alerts();
        assert!(servo.alerts().motor_faulted);

        servo.enable(false);
        servo.enable(true);
        servo.clear_alerts();
        assert!(!servo.alerts().any());
    }

    #[test]
    fn test_feedback_follows_input_while_enabled() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        assert!(!servo.feedback_asserted());
        hlfb.set(true);
        assert!(servo.feedback_asserted());
        servo.enable(false);
        assert!(!servo.feedback_asserted());
    }

    #[test]
    fn test_measured_torque_clamped() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        assert_eq!(servo.feedback_percent(), None);
        servo.set_measured_torque(Some(130.0));
        assert_eq!(servo.feedback_percent(), Some(100.0));
        servo.set_measured_torque(None);
        assert_eq!(servo.feedback_percent(), None);
    }

    #[test]
    fn test_torque_from_duty() {
        assert_eq!(torque_from_duty(0.5), 0.0);
        assert_eq!(torque_from_duty(0.95), 100.0);
        assert_eq!(torque_from_duty(0.0), 100.0);
        assert!(fabs(torque_from_duty(0.725) - 50.0) < 0.01);
    }

    #[test]
    fn test_reference_shift() {
        let hlfb = Cell::new(false);
        let mut servo = servo(&hlfb);
        servo.set_position_reference(-1200);
        assert_eq!(servo.commanded_position(), -1200);
        servo.move_relative(200);
        run(&mut servo, 500);
        assert_eq!(servo.commanded_position(), -1000);
    }
}
