//! Position and unit types for the saw axes
//!
//! Servos are commanded in integer steps; everything above the driver layer
//! works in user units (inches for the linear axes, degrees for the rotary
//! miter axis).

/// Tolerance for "move complete" checks on standalone moves and retracts
pub const ARRIVAL_TOLERANCE: f32 = 0.01;

/// Tolerance for batch sequence arrival checks
pub const SEQUENCE_TOLERANCE: f32 = 0.005;

/// Tolerance for the torque feed reaching its target
pub const FEED_TARGET_TOLERANCE: f32 = 0.001;

/// Axis identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Axis {
    /// Stock fence / length positioning
    X,
    /// Cutting table carrying the blade through the stock
    Y,
    /// Rotary miter
    Z,
}

impl Axis {
    /// All axes in tick order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index into per-axis arrays
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Absolute value without pulling in libm
#[inline]
pub fn fabs(value: f32) -> f32 {
    if value < 0.0 {
        -value
    } else {
        value
    }
}

/// Round to the nearest step, halves away from zero
#[inline]
pub fn round_steps(value: f32) -> i32 {
    if value >= 0.0 {
        (value + 0.5) as i32
    } else {
        (value - 0.5) as i32
    }
}

/// Check whether two positions agree within a tolerance
#[inline]
pub fn within(a: f32, b: f32, tolerance: f32) -> bool {
    fabs(a - b) <= tolerance
}

/// Steps-per-unit scaling for one axis
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    steps_per_unit: f32,
}

impl Calibration {
    /// Create a calibration; non-positive scales fall back to 1 step/unit
    pub fn new(steps_per_unit: f32) -> Self {
        let steps_per_unit = if steps_per_unit > 0.0 {
            steps_per_unit
        } else {
            1.0
        };
        Self { steps_per_unit }
    }

    pub fn steps_per_unit(&self) -> f32 {
        self.steps_per_unit
    }

    /// Convert a user-unit position or distance to steps
    pub fn to_steps(&self, units: f32) -> i32 {
        round_steps(units * self.steps_per_unit)
    }

    /// Convert steps to user units
    pub fn to_units(&self, steps: i32) -> f32 {
        steps as f32 / self.steps_per_unit
    }
}

/// Soft travel window `[0, max_travel]`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SoftLimits {
    max_travel: f32,
}

impl SoftLimits {
    pub fn new(max_travel: f32) -> Self {
        Self {
            max_travel: max_travel.max(0.0),
        }
    }

    pub fn max_travel(&self) -> f32 {
        self.max_travel
    }

    /// Check if a position is inside the travel window
    pub fn in_travel(&self, position: f32) -> bool {
        position >= 0.0 && position <= self.max_travel
    }

    /// Clamp a position into the travel window
    pub fn clamp_travel(&self, position: f32) -> f32 {
        position.clamp(0.0, self.max_travel)
    }
}
