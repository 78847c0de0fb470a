//! Servo plus geometry
//!
//! Shared by the axis controller and its homing and feed sub-controllers so
//! that each of them speaks user units while the servo speaks steps.

use crate::config::AxisConfig;
use crate::motion::{fabs, Calibration, SoftLimits};
use crate::traits::ServoDriver;

#[derive(Debug)]
pub struct AxisDrive<D> {
    driver: D,
    calibration: Calibration,
    limits: SoftLimits,
    max_velocity_sps: u32,
    max_accel_sps2: u32,
}

impl<D: ServoDriver> AxisDrive<D> {
    pub fn new(driver: D, config: &AxisConfig) -> Self {
        Self {
            driver,
            calibration: Calibration::new(config.steps_per_unit),
            limits: SoftLimits::new(config.max_travel),
            max_velocity_sps: config.max_velocity_sps,
            max_accel_sps2: config.max_accel_sps2,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn limits(&self) -> SoftLimits {
        self.limits
    }

    pub fn max_velocity_sps(&self) -> u32 {
        self.max_velocity_sps
    }

    pub fn max_accel_sps2(&self) -> u32 {
        self.max_accel_sps2
    }

    /// Commanded position in user units
    pub fn position(&self) -> f32 {
        self.calibration.to_units(self.driver.commanded_position())
    }

    pub fn is_moving(&self) -> bool {
        !self.driver.steps_complete()
    }

    /// Velocity limit for a fraction of max velocity
    pub fn scaled_velocity(&self, scale: f32) -> u32 {
        (self.max_velocity_sps as f32 * scale.clamp(0.0, 1.0)) as u32
    }

    /// Convert a linear speed (units/s) to a fraction of max velocity
    pub fn velocity_scale_for(&self, units_per_s: f32) -> f32 {
        if self.max_velocity_sps == 0 {
            return 0.0;
        }
        (units_per_s * self.calibration.steps_per_unit() / self.max_velocity_sps as f32)
            .clamp(0.0, 1.0)
    }

    /// Push the full configured limits to the drive
    pub fn apply_limits(&mut self) {
        self.driver.set_max_velocity(self.max_velocity_sps);
        self.driver.set_max_acceleration(self.max_accel_sps2);
    }

    /// Retune the velocity limit, including for a move in flight
    pub fn set_velocity_scale(&mut self, scale: f32) {
        let sps = self.scaled_velocity(scale);
        self.driver.set_max_velocity(sps);
    }

    /// Scale the acceleration limit relative to the configured maximum
    pub fn set_accel_factor(&mut self, factor: f32) {
        let sps2 = (self.max_accel_sps2 as f32 * factor.max(0.0)) as u32;
        self.driver.set_max_acceleration(sps2.max(1));
    }

    /// Start a positional move to `position` at `scale` of max velocity
    ///
    /// Issued as a relative move from the commanded position. Returns the
    /// step delta.
    pub fn move_to(&mut self, position: f32, scale: f32) -> i32 {
        self.set_velocity_scale(scale);
        let delta =
            self.calibration.to_steps(position) - self.driver.commanded_position();
        if delta != 0 {
            self.driver.move_relative(delta);
        }
        delta
    }

    /// Run continuously at a signed fraction of max velocity
    ///
    /// Returns the commanded velocity in steps/s.
    pub fn run_velocity(&mut self, signed_scale: f32) -> i32 {
        let magnitude = self.scaled_velocity(fabs(signed_scale)) as i32;
        let sps = if signed_scale < 0.0 { -magnitude } else { magnitude };
        self.driver.move_velocity(sps);
        sps
    }

    /// Torque reading in percent of peak
    ///
    /// Drives without an analog reading report 100% while the feedback
    /// output is asserted.
    pub fn torque_percent(&self) -> f32 {
        let raw = match self.driver.feedback_percent() {
            Some(percent) => percent,
            None if self.driver.feedback_asserted() => 100.0,
            None => 0.0,
        };
        raw.clamp(0.0, 100.0)
    }
}
