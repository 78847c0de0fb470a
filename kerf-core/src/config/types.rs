//! Configuration type definitions

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Current configuration layout version
pub const CONFIG_VERSION: u8 = 1;

/// Homing parameters for one axis
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HomingConfig {
    /// Seek the hard stop in the positive direction
    pub toward_positive: bool,
    /// Fast approach velocity (steps/s)
    pub fast_velocity_sps: u32,
    /// Longest time spent in fast approach before slowing down
    pub fast_approach_ms: u32,
    /// Pause between fast and slow approach
    pub dwell_ms: u32,
    /// Slow approach and back-off velocity (steps/s)
    pub slow_velocity_sps: u32,
    /// Distance to back off the hard stop before zeroing (steps)
    pub backoff_steps: u32,
    /// Overall homing time limit
    pub timeout_ms: u32,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            toward_positive: false,
            fast_velocity_sps: 8_000,
            fast_approach_ms: 4_000,
            dwell_ms: 250,
            slow_velocity_sps: 1_000,
            backoff_steps: 400,
            timeout_ms: 30_000,
        }
    }
}

/// Per-axis motion parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisConfig {
    /// Steps per user unit (inch or degree)
    pub steps_per_unit: f32,
    /// Soft travel limit in user units, travel is `[0, max_travel]`
    pub max_travel: f32,
    /// Maximum velocity (steps/s)
    pub max_velocity_sps: u32,
    /// Maximum acceleration (steps/s²)
    pub max_accel_sps2: u32,
    pub homing: HomingConfig,
}

impl AxisConfig {
    /// Stock fence: 800 steps/rev on a 5 TPI screw
    pub fn fence() -> Self {
        Self {
            steps_per_unit: 4_000.0,
            max_travel: 48.0,
            max_velocity_sps: 40_000,
            max_accel_sps2: 160_000,
            homing: HomingConfig::default(),
        }
    }

    /// Cutting table
    pub fn table() -> Self {
        Self {
            steps_per_unit: 4_000.0,
            max_travel: 14.0,
            max_velocity_sps: 32_000,
            max_accel_sps2: 120_000,
            homing: HomingConfig::default(),
        }
    }

    /// Rotary miter, 800 steps/rev through a 90:1 reduction, in degrees
    pub fn rotary() -> Self {
        Self {
            steps_per_unit: 200.0,
            max_travel: 90.0,
            max_velocity_sps: 6_000,
            max_accel_sps2: 24_000,
            homing: HomingConfig {
                fast_velocity_sps: 2_000,
                slow_velocity_sps: 300,
                backoff_steps: 100,
                ..HomingConfig::default()
            },
        }
    }
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self::fence()
    }
}

/// Torque-regulated feed parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeedConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Symmetric clamp on the integral term
    pub integral_limit: f32,
    /// Moving-average window for torque samples
    pub torque_window_ms: u32,
    /// Feed rate floor as a fraction of max velocity
    pub min_feed_rate: f32,
    /// Feed rate ceiling as a fraction of max velocity
    pub max_feed_rate: f32,
    /// Torque target (% of peak) used until one is set explicitly
    pub default_torque_target: f32,
    /// Starting feed rate as a fraction of the requested ceiling
    pub initial_velocity_fraction: f32,
    /// Time after start during which acceleration stays reduced
    pub ramp_window_ms: u32,
    /// Acceleration factor applied during the ramp window
    pub ramp_accel_factor: f32,
    /// Control steps shorter than this are skipped
    pub min_dt_s: f32,
    /// Control steps longer than this resync the clock and are skipped
    pub max_dt_s: f32,
    /// Feed rate change that forces a new velocity command
    pub significant_change: f32,
    /// Longest interval between velocity commands while feeding
    pub reissue_interval_ms: u32,
    /// Stationary time at the target before retracting
    pub settle_ms: u32,
    /// Retract velocity steps as fractions of max velocity
    pub retract_profile: [f32; 3],
    /// Time spent at each retract velocity step
    pub retract_step_ms: u32,
    /// Time between the two resume velocity steps
    pub resume_step_ms: u32,
    /// Acceleration factor for a paused (feed hold) stop
    pub pause_accel_factor: f32,
    /// Acceleration factor for an aborted feed stop
    pub abort_accel_factor: f32,
    /// Delay before restoring acceleration after an abort
    pub abort_restore_ms: u32,
    /// Return to the start position after reaching the target
    pub auto_retract: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            kp: 0.004,
            ki: 0.001,
            kd: 0.0005,
            integral_limit: 50.0,
            torque_window_ms: 400,
            min_feed_rate: 0.005,
            max_feed_rate: 1.0,
            default_torque_target: 40.0,
            initial_velocity_fraction: 0.15,
            ramp_window_ms: 500,
            ramp_accel_factor: 0.3,
            min_dt_s: 0.005,
            max_dt_s: 0.5,
            significant_change: 0.01,
            reissue_interval_ms: 100,
            settle_ms: 100,
            retract_profile: [0.3, 0.6, 1.0],
            retract_step_ms: 150,
            resume_step_ms: 150,
            pause_accel_factor: 0.5,
            abort_accel_factor: 0.4,
            abort_restore_ms: 200,
            auto_retract: true,
        }
    }
}

/// Batch cut geometry and speeds
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SequenceConfig {
    /// Table position clear of the stock
    pub retract_y: f32,
    /// Table position where the blade meets the stock
    pub cut_start_y: f32,
    /// Table position where the blade has cleared the stock
    pub cut_stop_y: f32,
    /// Cutting torque target (% of peak)
    pub torque_target: f32,
    pub x_velocity_scale: f32,
    pub y_velocity_scale: f32,
    /// Feed rate ceiling for the cutting pass
    pub feed_velocity_scale: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            retract_y: 0.0,
            cut_start_y: 1.0,
            cut_stop_y: 10.0,
            torque_target: 40.0,
            x_velocity_scale: 1.0,
            y_velocity_scale: 0.8,
            feed_velocity_scale: 0.5,
        }
    }
}

/// Cycle coordinator timing
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CycleConfig {
    /// Spin-up time between spindle start and the first move
    pub spindle_settle_ms: u32,
    /// Time in error before semi-auto attempts recovery
    pub error_recovery_ms: u32,
    /// Dwell at the cut start before semi-auto reports ready
    pub start_settle_ms: u32,
    /// Semi-auto feed rate (inches per minute)
    pub semi_feed_rate_ipm: f32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            spindle_settle_ms: 500,
            error_recovery_ms: 5_000,
            start_settle_ms: 200,
            semi_feed_rate_ipm: 20.0,
        }
    }
}

/// Safety chain behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SafetyConfig {
    /// Re-energize the safety relay when the chain closes again
    pub auto_reset: bool,
}

/// Fence encoder cross-check
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackerConfig {
    /// Encoder counts per user unit
    pub counts_per_unit: f32,
    /// Largest tolerated difference between commanded and measured position
    pub max_deviation: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            counts_per_unit: 2_000.0,
            max_deviation: 0.02,
        }
    }
}

/// Complete machine configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MachineConfig {
    /// Layout version, stored configs with another version are ignored
    pub version: u8,
    pub x: AxisConfig,
    pub y: AxisConfig,
    pub z: AxisConfig,
    pub feed: FeedConfig,
    pub sequence: SequenceConfig,
    pub cycle: CycleConfig,
    pub safety: SafetyConfig,
    pub tracker: TrackerConfig,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            x: AxisConfig::fence(),
            y: AxisConfig::table(),
            z: AxisConfig::rotary(),
            feed: FeedConfig::default(),
            sequence: SequenceConfig::default(),
            cycle: CycleConfig::default(),
            safety: SafetyConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl MachineConfig {
    /// Check whether a loaded config matches this firmware's layout
    pub fn is_current(&self) -> bool {
        self.version == CONFIG_VERSION
    }
}
