//! PID regulator for the feed loop
//!
//! Floating point with a clamped integral. The output is a rate of change
//! of feed rate; the caller integrates it over `dt`.

use crate::config::FeedConfig;

/// PID gains
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidCoefficients {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidCoefficients {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pid {
    coefficients: PidCoefficients,
    integral_limit: f32,
    integral: f32,
    prev_error: Option<f32>,
}

impl Pid {
    pub fn new(coefficients: PidCoefficients, integral_limit: f32) -> Self {
        Self {
            coefficients,
            integral_limit: integral_limit.max(0.0),
            integral: 0.0,
            prev_error: None,
        }
    }

    pub fn coefficients(&self) -> PidCoefficients {
        self.coefficients
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn last_error(&self) -> Option<f32> {
        self.prev_error
    }

    /// Clear accumulated state
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// Run one step with `dt` in seconds (must be positive)
    pub fn step(&mut self, error: f32, dt: f32) -> f32 {
        let c = self.coefficients;

        self.integral =
            (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);

        // No derivative kick on the first step
        let derivative = match self.prev_error {
            Some(prev) => (error - prev) / dt,
            None => 0.0,
        };
        self.prev_error = Some(error);

        c.kp * error + c.ki * self.integral + c.kd * derivative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains(kp: f32, ki: f32, kd: f32) -> PidCoefficients {
        PidCoefficients { kp, ki, kd }
    }

    #[test]
    fn test_proportional_only() {
        let mut pid = Pid::new(gains(0.5, 0.0, 0.0), 10.0);
        assert_eq!(pid.step(4.0, 0.01), 2.0);
        assert_eq!(pid.step(-4.0, 0.01), -2.0);
    }

    #[test]
    fn test_integral_is_clamped() {
        let mut pid = Pid::new(gains(0.0, 1.0, 0.0), 5.0);
        for _ in 0..100 {
            pid.step(100.0, 0.1);
        }
        assert_eq!(pid.integral(), 5.0);
        for _ in 0..100 {
            pid.step(-100.0, 0.1);
        }
        assert_eq!(pid.integral(), -5.0);
    }

    #[test]
    fn test_no_derivative_kick_on_first_step() {
        let mut pid = Pid::new(gains(0.0, 0.0, 1.0), 10.0);
        assert_eq!(pid.step(50.0, 0.01), 0.0);
        // (40 - 50) / 0.5
        assert_eq!(pid.step(40.0, 0.5), -20.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pid = Pid::new(gains(0.0, 1.0, 1.0), 10.0);
        pid.step(3.0, 1.0);
        assert_eq!(pid.last_error(), Some(3.0));
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.last_error(), None);
        assert_eq!(pid.step(0.0, 1.0), 0.0);
    }
}
