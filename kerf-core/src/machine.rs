//! Machine orchestrator
//!
//! Owns every controller and runs them in a fixed order each tick: safety
//! first, then the axes, then the position cross-check, then the active
//! cycle. UI adapters read [`MachineStatus`] and call the command methods;
//! nothing else touches the controllers.

use kerf_hal::gpio::{InputPin, OutputPin};

use crate::axis::{AxisController, AxisError, AxisStatus};
use crate::config::MachineConfig;
use crate::cycle::{Cycle, CycleContext, CycleError, CycleKind, CycleStatus};
use crate::motion::Axis;
use crate::safety::{InterlockEvent, PositionTracker, SafetyError, SafetyInterlock, TrackerStatus};
use crate::sequence::{BatchState, CutSequenceController, SequenceError, SequenceState};
use crate::traits::{EncoderInput, ProgressStore, ServoDriver, SpindleDriver};

/// Machine command errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MachineError {
    /// Manual commands are refused while a cycle runs
    CycleActive,
    Axis(AxisError),
    Sequence(SequenceError),
    Cycle(CycleError),
    Safety(SafetyError),
}

impl From<AxisError> for MachineError {
    fn from(err: AxisError) -> Self {
        MachineError::Axis(err)
    }
}

impl From<SequenceError> for MachineError {
    fn from(err: SequenceError) -> Self {
        MachineError::Sequence(err)
    }
}

impl From<CycleError> for MachineError {
    fn from(err: CycleError) -> Self {
        MachineError::Cycle(err)
    }
}

impl From<SafetyError> for MachineError {
    fn from(err: SafetyError) -> Self {
        MachineError::Safety(err)
    }
}

/// Hardware handed to the machine at construction
pub struct MachineParts<D, SP, S, I, O, E> {
    /// Fence servo
    pub x: D,
    /// Table servo
    pub y: D,
    /// Miter servo
    pub z: D,
    pub spindle: SP,
    pub store: S,
    /// Emergency-stop chain, high when safe
    pub safety_input: I,
    pub relay: O,
    /// Fence encoder
    pub encoder: E,
}

/// Read-only snapshot for status consumers
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MachineStatus {
    /// Indexed by [`Axis::index`]
    pub axes: [AxisStatus; 3],
    pub cycle: CycleStatus,
    pub sequence: SequenceState,
    pub batch: BatchState,
    pub total_cuts: u32,
    pub current_index: u32,
    pub spindle_running: bool,
    pub relay_engaged: bool,
    pub safety_tripped: bool,
    pub tracker: TrackerStatus,
    pub fence_deviation: f32,
    /// Table torque (% of peak)
    pub torque_percent: f32,
    /// Table feed rate (fraction of max velocity)
    pub feed_rate: f32,
}

pub struct Machine<D, SP, S, I, O, E> {
    config: MachineConfig,
    x: AxisController<D>,
    y: AxisController<D>,
    z: AxisController<D>,
    sequence: CutSequenceController,
    cycle: Cycle,
    interlock: SafetyInterlock<I, O>,
    tracker: PositionTracker<E>,
    tracker_status: TrackerStatus,
    spindle: SP,
    store: S,
    x_home_seen: u32,
    now_ms: u32,
}

impl<D, SP, S, I, O, E> Machine<D, SP, S, I, O, E>
where
    D: ServoDriver,
    SP: SpindleDriver,
    S: ProgressStore,
    I: InputPin,
    O: OutputPin,
    E: EncoderInput,
{
    pub fn new(parts: MachineParts<D, SP, S, I, O, E>, config: MachineConfig) -> Self {
        Self {
            x: AxisController::new(Axis::X, parts.x, &config.x, &config.feed),
            y: AxisController::new(Axis::Y, parts.y, &config.y, &config.feed),
            z: AxisController::new(Axis::Z, parts.z, &config.z, &config.feed),
            sequence: CutSequenceController::new(config.sequence),
            cycle: Cycle::new(CycleKind::AutoCut, &config.cycle, &config.sequence),
            interlock: SafetyInterlock::new(parts.safety_input, parts.relay, &config.safety),
            tracker: PositionTracker::new(parts.encoder, &config.tracker),
            tracker_status: TrackerStatus::Unreferenced,
            spindle: parts.spindle,
            store: parts.store,
            x_home_seen: 0,
            now_ms: 0,
            config,
        }
    }

    /// Enable every axis and load stored progress
    ///
    /// All axes are attempted; the first failure is returned.
    pub fn setup(&mut self) -> Result<(), MachineError> {
        let results = [self.x.setup(), self.y.setup(), self.z.setup()];
        if let Err(err) = self.sequence.load_position_state(&mut self.store) {
            warn!("no stored progress: {}", err);
        }
        for result in results {
            result?;
        }
        info!("machine ready");
        Ok(())
    }

    fn split(&mut self) -> (&mut Cycle, CycleContext<'_, D, SP, S>) {
        let motion_permitted = self.interlock.motion_permitted();
        (
            &mut self.cycle,
            CycleContext {
                x: &mut self.x,
                y: &mut self.y,
                sequence: &mut self.sequence,
                spindle: &mut self.spindle,
                store: &mut self.store,
                motion_permitted,
            },
        )
    }

    /// Run one control step
    pub fn tick(&mut self, now_ms: u32) {
        self.now_ms = now_ms;

        if self.interlock.poll(&mut self.spindle) == InterlockEvent::Tripped {
            self.x.emergency_stop();
            self.y.emergency_stop();
            self.z.emergency_stop();
            let (cycle, mut ctx) = self.split();
            cycle.cancel(&mut ctx, now_ms);
        }

        let permitted = self.interlock.motion_permitted();
        self.x.set_motion_permit(permitted);
        self.y.set_motion_permit(permitted);
        self.z.set_motion_permit(permitted);

        self.x.update(now_ms);
        self.y.update(now_ms);
        self.z.update(now_ms);

        self.check_fence();
        self.spindle.update(now_ms);

        let (cycle, mut ctx) = self.split();
        cycle.update(&mut ctx, now_ms);
    }

    fn check_fence(&mut self) {
        if self.x.home_count() != self.x_home_seen {
            self.x_home_seen = self.x.home_count();
            self.tracker.rebase(self.x.position());
        }
        // Commanded and measured only agree at rest
        if self.x.is_moving() {
            return;
        }
        let status = self.tracker.check(self.x.position());
        if status == TrackerStatus::Deviation && self.tracker_status != TrackerStatus::Deviation {
            error!(
                "fence off by {} at {}",
                self.tracker.deviation(),
                self.x.position()
            );
            if self.cycle.kind() == CycleKind::AutoCut && self.cycle.is_active() {
                let (cycle, mut ctx) = self.split();
                if let Err(err) = cycle.pause(&mut ctx) {
                    warn!("feed hold on deviation refused: {}", err);
                }
            }
        }
        self.tracker_status = status;
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut AxisController<D> {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }

    fn ensure_manual(&self) -> Result<(), MachineError> {
        if self.cycle.is_active() || self.sequence.is_active() {
            return Err(MachineError::CycleActive);
        }
        Ok(())
    }

    pub fn home(&mut self, axis: Axis) -> Result<(), MachineError> {
        self.ensure_manual()?;
        let now = self.now_ms;
        self.axis_mut(axis).start_homing(now)?;
        Ok(())
    }

    /// Start homing every axis at once
    pub fn home_all(&mut self) -> Result<(), MachineError> {
        for axis in Axis::ALL {
            self.home(axis)?;
        }
        Ok(())
    }

    pub fn move_axis(&mut self, axis: Axis, position: f32, scale: f32) -> Result<(), MachineError> {
        self.ensure_manual()?;
        self.axis_mut(axis).move_to(position, scale)?;
        Ok(())
    }

    pub fn jog(&mut self, axis: Axis, delta: f32, scale: f32) -> Result<(), MachineError> {
        self.ensure_manual()?;
        self.axis_mut(axis).jog(delta, scale)?;
        Ok(())
    }

    /// Decelerate every axis and cancel the cycle
    pub fn stop_all(&mut self) {
        let now = self.now_ms;
        let (cycle, mut ctx) = self.split();
        cycle.cancel(&mut ctx, now);
        self.x.stop();
        self.y.stop();
        self.z.stop();
    }

    /// Halt every axis and the spindle without ramps
    pub fn emergency_stop(&mut self) {
        self.x.emergency_stop();
        self.y.emergency_stop();
        self.z.emergency_stop();
        self.spindle.emergency_stop();
        let now = self.now_ms;
        let (cycle, mut ctx) = self.split();
        cycle.cancel(&mut ctx, now);
        warn!("machine emergency stop");
    }

    pub fn clear_alerts(&mut self, axis: Axis) -> Result<(), MachineError> {
        let now = self.now_ms;
        self.axis_mut(axis).clear_alerts(now)?;
        Ok(())
    }

    pub fn build_positions(&mut self, zero: f32, increment: f32, count: usize) -> Result<(), MachineError> {
        self.sequence
            .build_x_positions(zero, increment, count, &mut self.store)?;
        Ok(())
    }

    /// Returns the effective batch size
    pub fn set_batch_size(&mut self, size: u32) -> u32 {
        self.sequence.set_batch_size(size)
    }

    /// Forget batch progress, stored and in memory
    pub fn reset_progress(&mut self) -> Result<(), MachineError> {
        self.ensure_manual()?;
        if self.sequence.state().is_terminal() {
            self.sequence.acknowledge()?;
        }
        self.sequence.reset(&mut self.store)?;
        Ok(())
    }

    /// Switch cycle variant; refused while a cycle runs
    pub fn select_cycle(&mut self, kind: CycleKind) -> Result<(), MachineError> {
        if self.cycle.is_active() {
            return Err(MachineError::CycleActive);
        }
        if self.cycle.kind() != kind {
            self.cycle = Cycle::new(kind, &self.config.cycle, &self.sequence_config());
            info!("cycle {} selected", kind);
        }
        Ok(())
    }

    fn sequence_config(&self) -> crate::config::SequenceConfig {
        *self.sequence.config()
    }

    pub fn start_cycle(&mut self) -> Result<(), MachineError> {
        let now = self.now_ms;
        let (cycle, mut ctx) = self.split();
        cycle.start(&mut ctx, now)?;
        Ok(())
    }

    pub fn pause_cycle(&mut self) -> Result<(), MachineError> {
        let (cycle, mut ctx) = self.split();
        cycle.pause(&mut ctx)?;
        Ok(())
    }

    pub fn resume_cycle(&mut self) -> Result<(), MachineError> {
        let now = self.now_ms;
        let (cycle, mut ctx) = self.split();
        cycle.resume(&mut ctx, now)?;
        Ok(())
    }

    /// Auto-cut pause/resume toggle
    pub fn feed_hold(&mut self) -> Result<(), MachineError> {
        let now = self.now_ms;
        let (cycle, mut ctx) = self.split();
        cycle.feed_hold(&mut ctx, now)?;
        Ok(())
    }

    pub fn exit_feed_hold(&mut self) -> Result<(), MachineError> {
        let now = self.now_ms;
        let (cycle, mut ctx) = self.split();
        cycle.exit_feed_hold(&mut ctx, now)?;
        Ok(())
    }

    pub fn feed_to_stop(&mut self) -> Result<(), MachineError> {
        let (cycle, mut ctx) = self.split();
        cycle.feed_to_stop(&mut ctx)?;
        Ok(())
    }

    pub fn finish_semi(&mut self) -> Result<(), MachineError> {
        let (cycle, mut ctx) = self.split();
        cycle.finish(&mut ctx)?;
        Ok(())
    }

    pub fn cancel_cycle(&mut self) {
        let now = self.now_ms;
        let (cycle, mut ctx) = self.split();
        cycle.cancel(&mut ctx, now);
    }

    pub fn force_reset(&mut self) {
        let now = self.now_ms;
        let (cycle, mut ctx) = self.split();
        cycle.force_reset(&mut ctx, now);
    }

    /// Semi-auto feed rate (inches per minute)
    pub fn set_semi_feed_rate(&mut self, ipm: f32) -> Result<f32, MachineError> {
        let (cycle, mut ctx) = self.split();
        Ok(cycle.set_feed_rate(&mut ctx, ipm)?)
    }

    /// Cutting torque target for the live feed and every following cut
    pub fn set_torque_target(&mut self, percent: f32) -> f32 {
        let applied = self.y.set_torque_target(percent);
        self.sequence.set_torque_target(applied)
    }

    pub fn request_safety_reset(&mut self) -> Result<(), MachineError> {
        self.interlock.request_reset()?;
        Ok(())
    }

    pub fn axis(&self, axis: Axis) -> &AxisController<D> {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    /// Direct driver access for step generation and diagnostics
    pub fn driver_mut(&mut self, axis: Axis) -> &mut D {
        self.axis_mut(axis).driver_mut()
    }

    pub fn sequence(&self) -> &CutSequenceController {
        &self.sequence
    }

    pub fn cycle(&self) -> &Cycle {
        &self.cycle
    }

    pub fn interlock(&self) -> &SafetyInterlock<I, O> {
        &self.interlock
    }

    pub fn tracker(&self) -> &PositionTracker<E> {
        &self.tracker
    }

    pub fn spindle(&self) -> &SP {
        &self.spindle
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn status(&self) -> MachineStatus {
        let feed = self.y.feed();
        MachineStatus {
            axes: [self.x.status(), self.y.status(), self.z.status()],
            cycle: self.cycle.status(),
            sequence: self.sequence.state(),
            batch: self.sequence.batch(),
            total_cuts: self.sequence.total_cuts(),
            current_index: self.sequence.current_index() as u32,
            spindle_running: self.spindle.is_running(),
            relay_engaged: self.interlock.relay_engaged(),
            safety_tripped: self.interlock.is_tripped(),
            tracker: self.tracker_status,
            fence_deviation: self.tracker.deviation(),
            torque_percent: self.y.torque_percent(),
            feed_rate: feed.feed_rate(),
        }
    }
}
