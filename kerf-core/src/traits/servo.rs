//! Servo driver trait
//!
//! Abstracts a closed-loop step/direction servo (ClearPath style) with a
//! configurable feedback output. All positions and velocities are in steps.

/// Alert flags reported by a servo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoAlerts {
    /// Motor reported a shutdown fault
    pub motor_faulted: bool,
    /// Enable was requested but the motor never reported ready
    pub enable_not_ready: bool,
    /// A move was canceled by the drive
    pub move_canceled: bool,
    /// Tracking error exceeded the drive limit
    pub following_error: bool,
}

impl ServoAlerts {
    pub const NONE: Self = Self {
        motor_faulted: false,
        enable_not_ready: false,
        move_canceled: false,
        following_error: false,
    };

    /// Check if any alert is raised
    pub fn any(&self) -> bool {
        self.motor_faulted || self.enable_not_ready || self.move_canceled || self.following_error
    }

    /// Check if clearing requires an enable cycle
    pub fn needs_enable_cycle(&self) -> bool {
        self.motor_faulted
    }
}

/// Trait for servo motor drivers
///
/// Motion commands are non-blocking: they start a move and return. Progress
/// is observed through `steps_complete()` and `commanded_position()`.
pub trait ServoDriver {
    /// Enable or disable the drive
    fn enable(&mut self, enabled: bool);

    /// Check if the drive is enabled and ready
    fn is_enabled(&self) -> bool;

    /// Velocity limit applied to positional moves, including one in flight
    fn set_max_velocity(&mut self, steps_per_s: u32);

    /// Acceleration limit for every motion command
    fn set_max_acceleration(&mut self, steps_per_s2: u32);

    /// Start a positional move to an absolute step position
    fn move_absolute(&mut self, position: i32);

    /// Start a positional move relative to the commanded position
    fn move_relative(&mut self, delta: i32);

    /// Run continuously at a signed velocity until stopped
    ///
    /// Replaces any move in progress. The change is acceleration limited.
    fn move_velocity(&mut self, steps_per_s: i32);

    /// Ramp down to a stop at the acceleration limit
    fn stop_decelerate(&mut self);

    /// Stop immediately without a ramp
    fn stop_abrupt(&mut self);

    /// Check if no motion is being commanded
    fn steps_complete(&self) -> bool;

    /// Current commanded step position
    fn commanded_position(&self) -> i32;

    /// Redefine the current commanded position
    fn set_position_reference(&mut self, position: i32);

    /// Digital feedback output (hard stop / torque threshold reached)
    fn feedback_asserted(&self) -> bool;

    /// Measured torque as a percentage of peak, if the drive reports one
    fn feedback_percent(&self) -> Option<f32>;

    /// Current alert flags
    fn alerts(&self) -> ServoAlerts;

    /// Clear latched alerts
    fn clear_alerts(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_alerts() {
        assert!(!ServoAlerts::NONE.any());
        assert_eq!(ServoAlerts::default(), ServoAlerts::NONE);
    }

    #[test]
    fn test_fault_needs_enable_cycle() {
        let alerts = ServoAlerts {
            motor_faulted: true,
            ..ServoAlerts::NONE
        };
        assert!(alerts.any());
        assert!(alerts.needs_enable_cycle());

        let alerts = ServoAlerts {
            move_canceled: true,
            ..ServoAlerts::NONE
        };
        assert!(alerts.any());
        assert!(!alerts.needs_enable_cycle());
    }
}
