//! Simulated hardware for host tests

use core::cell::Cell;

use kerf_hal::gpio::{InputPin, OutputPin};

use crate::axis::AxisController;
use crate::config::{AxisConfig, FeedConfig, SequenceConfig};
use crate::cycle::CycleContext;
use crate::motion::{round_steps, Axis};
use crate::sequence::CutSequenceController;
use crate::traits::{
    EncoderInput, ProgressStore, ServoAlerts, ServoDriver, SpindleDriver, SpindleError,
    StoreError,
};

/// Kinematic servo model
///
/// Positional moves run at the velocity limit with no ramp, velocity moves
/// run at the commanded speed, and every stop is immediate. An optional hard
/// stop on the negative side clamps motion and asserts feedback while the
/// axis pushes against it.
#[derive(Debug)]
pub struct SimServo {
    pub enabled: bool,
    pub refuse_enable: bool,
    position: f32,
    target: Option<i32>,
    velocity: i32,
    pub max_velocity: u32,
    pub max_accel: u32,
    pub hard_stop: Option<i32>,
    at_stop: bool,
    pub feedback: bool,
    pub torque: Option<f32>,
    pub alerts: ServoAlerts,
    /// Alerts survive every clear attempt
    pub sticky: bool,
    power_cycled: bool,
    pub clear_count: u32,
    pub abrupt_stops: u32,
    pub moves: u32,
}

impl SimServo {
    pub fn new() -> Self {
        Self {
            enabled: false,
            refuse_enable: false,
            position: 0.0,
            target: None,
            velocity: 0,
            max_velocity: 0,
            max_accel: 0,
            hard_stop: None,
            at_stop: false,
            feedback: false,
            torque: None,
            alerts: ServoAlerts::NONE,
            sticky: false,
            power_cycled: false,
            clear_count: 0,
            abrupt_stops: 0,
            moves: 0,
        }
    }

    pub fn with_hard_stop(steps: i32) -> Self {
        Self {
            hard_stop: Some(steps),
            ..Self::new()
        }
    }

    pub fn velocity(&self) -> i32 {
        self.velocity
    }

    pub fn target(&self) -> Option<i32> {
        self.target
    }

    /// Advance the model by `ms` milliseconds
    pub fn advance(&mut self, ms: u32) {
        if !self.enabled {
            return;
        }
        let dt = ms as f32 / 1000.0;
        if self.velocity != 0 {
            self.position += self.velocity as f32 * dt;
        } else if let Some(target) = self.target {
            let step = self.max_velocity as f32 * dt;
            let diff = target as f32 - self.position;
            if diff.clamp(-step, step) == diff {
                self.position = target as f32;
                self.target = None;
            } else if diff > 0.0 {
                self.position += step;
            } else {
                self.position -= step;
            }
        }

        self.at_stop = false;
        if let Some(stop) = self.hard_stop {
            if self.position <= stop as f32 {
                self.position = stop as f32;
                let pushing = self.velocity < 0 || self.target.is_some_and(|t| t < stop);
                self.at_stop = pushing;
            }
        }
    }
}

impl ServoDriver for SimServo {
    fn enable(&mut self, enabled: bool) {
        self.enabled = enabled && !self.refuse_enable;
        if !self.enabled {
            self.velocity = 0;
            self.target = None;
            self.power_cycled = true;
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_max_velocity(&mut self, steps_per_s: u32) {
        self.max_velocity = steps_per_s;
    }

    fn set_max_acceleration(&mut self, steps_per_s2: u32) {
        self.max_accel = steps_per_s2;
    }

    fn move_absolute(&mut self, position: i32) {
        self.velocity = 0;
        self.target = Some(position);
        self.moves += 1;
    }

    fn move_relative(&mut self, delta: i32) {
        let base = self.commanded_position();
        self.move_absolute(base + delta);
    }

    fn move_velocity(&mut self, steps_per_s: i32) {
        self.target = None;
        self.velocity = steps_per_s;
        self.moves += 1;
    }

    fn stop_decelerate(&mut self) {
        self.velocity = 0;
        self.target = None;
    }

    fn stop_abrupt(&mut self) {
        self.stop_decelerate();
        self.abrupt_stops += 1;
    }

    fn steps_complete(&self) -> bool {
        self.velocity == 0 && self.target.is_none()
    }

    fn commanded_position(&self) -> i32 {
        round_steps(self.position)
    }

    fn set_position_reference(&mut self, position: i32) {
        let shift = position - self.commanded_position();
        self.position = position as f32;
        if let Some(stop) = self.hard_stop.as_mut() {
            *stop += shift;
        }
    }

    fn feedback_asserted(&self) -> bool {
        self.feedback || self.at_stop
    }

    fn feedback_percent(&self) -> Option<f32> {
        self.torque
    }

    fn alerts(&self) -> ServoAlerts {
        self.alerts
    }

    fn clear_alerts(&mut self) {
        self.clear_count += 1;
        if self.sticky {
            return;
        }
        if !self.alerts.motor_faulted || self.power_cycled {
            self.alerts = ServoAlerts::NONE;
            self.power_cycled = false;
        }
    }
}

/// In-memory progress store
#[derive(Debug, Default)]
pub struct MemStore {
    pub value: Option<u32>,
    pub saves: u32,
    pub fail: bool,
}

impl ProgressStore for MemStore {
    fn load(&mut self) -> Result<u32, StoreError> {
        if self.fail {
            return Err(StoreError::Unavailable);
        }
        Ok(self.value.unwrap_or(0))
    }

    fn save(&mut self, last_completed: u32) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Unavailable);
        }
        self.value = Some(last_completed);
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Unavailable);
        }
        self.value = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockSpindle {
    pub running: bool,
    pub starts: u32,
    pub stops: u32,
    pub emergency_stops: u32,
    pub refuse: Option<SpindleError>,
}

impl SpindleDriver for MockSpindle {
    fn start(&mut self) -> Result<(), SpindleError> {
        if let Some(err) = self.refuse {
            return Err(err);
        }
        self.running = true;
        self.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.stops += 1;
    }

    fn emergency_stop(&mut self) {
        self.running = false;
        self.emergency_stops += 1;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Input pin whose level the test controls through a shared cell
pub struct SharedPin<'a>(pub &'a Cell<bool>);

impl InputPin for SharedPin<'_> {
    fn is_high(&self) -> bool {
        self.0.get()
    }
}

/// Output pin that mirrors its level into a shared cell
pub struct SharedOut<'a>(pub &'a Cell<bool>);

impl OutputPin for SharedOut<'_> {
    fn set_high(&mut self) {
        self.0.set(true);
    }

    fn set_low(&mut self) {
        self.0.set(false);
    }

    fn is_set_high(&self) -> bool {
        self.0.get()
    }
}

pub struct SharedEncoder<'a>(pub &'a Cell<i32>);

impl EncoderInput for SharedEncoder<'_> {
    fn count(&self) -> i32 {
        self.0.get()
    }
}

/// Advance a simulated axis by `ms` and run its update
pub fn step_axis(axis: &mut AxisController<SimServo>, now: &mut u32, ms: u32) {
    axis.driver_mut().advance(ms);
    *now = now.wrapping_add(ms);
    axis.update(*now);
}

/// Step a simulated axis until `done` holds or `limit_ms` runs out
pub fn run_axis_until(
    axis: &mut AxisController<SimServo>,
    now: &mut u32,
    limit_ms: u32,
    mut done: impl FnMut(&AxisController<SimServo>) -> bool,
) -> bool {
    let start = *now;
    while now.wrapping_sub(start) < limit_ms {
        step_axis(axis, now, 10);
        if done(axis) {
            return true;
        }
    }
    false
}

/// Fence, table, sequencer, spindle and store wired for cycle tests
pub struct CycleRig {
    pub x: AxisController<SimServo>,
    pub y: AxisController<SimServo>,
    pub sequence: CutSequenceController,
    pub spindle: MockSpindle,
    pub store: MemStore,
    pub permitted: bool,
    pub now: u32,
}

impl CycleRig {
    pub fn new() -> Self {
        let feed = FeedConfig::default();
        let mut x = AxisController::new(Axis::X, SimServo::new(), &AxisConfig::fence(), &feed);
        let mut y = AxisController::new(Axis::Y, SimServo::new(), &AxisConfig::table(), &feed);
        x.setup().unwrap();
        y.setup().unwrap();
        Self {
            x,
            y,
            sequence: CutSequenceController::new(SequenceConfig::default()),
            spindle: MockSpindle::default(),
            store: MemStore::default(),
            permitted: true,
            now: 0,
        }
    }

    pub fn build(&mut self, zero: f32, increment: f32, count: usize) {
        self.sequence
            .build_x_positions(zero, increment, count, &mut self.store)
            .unwrap();
    }

    pub fn ctx(&mut self) -> CycleContext<'_, SimServo, MockSpindle, MemStore> {
        CycleContext {
            x: &mut self.x,
            y: &mut self.y,
            sequence: &mut self.sequence,
            spindle: &mut self.spindle,
            store: &mut self.store,
            motion_permitted: self.permitted,
        }
    }

    /// Advance the servos and axes by 10 ms, then run `cycle`
    pub fn tick_with(&mut self, mut cycle: impl FnMut(&mut Self)) {
        self.x.driver_mut().advance(10);
        self.y.driver_mut().advance(10);
        self.now += 10;
        self.x.set_motion_permit(self.permitted);
        self.y.set_motion_permit(self.permitted);
        self.x.update(self.now);
        self.y.update(self.now);
        cycle(self);
    }

    /// Tick until `cycle` reports done or `limit_ms` runs out
    pub fn run_until(&mut self, limit_ms: u32, mut cycle: impl FnMut(&mut Self) -> bool) -> bool {
        let end = self.now + limit_ms;
        while self.now < end {
            let mut done = false;
            self.tick_with(|r| done = cycle(r));
            if done {
                return true;
            }
        }
        false
    }
}
