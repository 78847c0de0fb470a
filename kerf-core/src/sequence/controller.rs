//! Cut sequence controller

use heapless::Vec;

use crate::axis::{AxisController, AxisError};
use crate::config::SequenceConfig;
use crate::feed::{FeedState, TORQUE_TARGET_RANGE};
use crate::motion::{within, SEQUENCE_TOLERANCE};
use crate::traits::{ProgressStore, ServoDriver, StoreError};

use super::state::{SequenceEvent, SequenceState};

/// Longest cut list a batch can hold
pub const MAX_CUT_POSITIONS: usize = 256;

/// Sequence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceError {
    /// A batch is running or paused
    Busy,
    /// Operation requires an idle sequence
    NotIdle,
    /// Operation requires a running sequence
    NotRunning,
    NotPaused,
    NotActive,
    /// Operation requires a completed or aborted sequence
    NotFinished,
    /// Position list is empty
    NoPositions,
    /// Position list would exceed `MAX_CUT_POSITIONS`
    TooManyPositions,
    /// Batch size is zero
    InvalidBatchSize,
    /// Every position has been cut
    NothingRemaining,
    /// Feed stopped before reaching the cut stop
    CutInterrupted,
    Axis(AxisError),
    Store(StoreError),
}

impl From<AxisError> for SequenceError {
    fn from(err: AxisError) -> Self {
        SequenceError::Axis(err)
    }
}

impl From<StoreError> for SequenceError {
    fn from(err: StoreError) -> Self {
        SequenceError::Store(err)
    }
}

/// Batch bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatchState {
    /// Cuts completed from the start of the list; the persisted value
    pub last_completed: u32,
    /// Cuts to make in the current batch
    pub batch_size: u32,
    /// `last_completed` when the batch started
    pub batch_start: u32,
    /// Cuts made so far in the current batch
    pub batch_completed: u32,
}

/// Axes and storage borrowed for one sequence update
pub struct SequenceIo<'a, D, S> {
    pub x: &'a mut AxisController<D>,
    pub y: &'a mut AxisController<D>,
    pub store: &'a mut S,
}

pub struct CutSequenceController {
    config: SequenceConfig,
    positions: Vec<f32, MAX_CUT_POSITIONS>,
    cursor: usize,
    requested_batch: u32,
    batch: BatchState,
    state: SequenceState,
    paused_from: Option<SequenceState>,
    move_issued: bool,
}

impl CutSequenceController {
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            config,
            positions: Vec::new(),
            cursor: 0,
            requested_batch: u32::MAX,
            batch: BatchState::default(),
            state: SequenceState::Idle,
            paused_from: None,
            move_issued: false,
        }
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    /// Torque target applied at the start of every following cut
    pub fn set_torque_target(&mut self, percent: f32) -> f32 {
        let (lo, hi) = TORQUE_TARGET_RANGE;
        self.config.torque_target = percent.clamp(lo, hi);
        self.config.torque_target
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn paused_from(&self) -> Option<SequenceState> {
        self.paused_from
    }

    pub fn batch(&self) -> BatchState {
        self.batch
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn total_cuts(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn last_completed(&self) -> u32 {
        self.batch.last_completed
    }

    pub fn remaining(&self) -> u32 {
        self.total_cuts().saturating_sub(self.batch.last_completed)
    }

    pub fn batch_size(&self) -> u32 {
        self.batch.batch_size
    }

    pub fn batch_completed(&self) -> u32 {
        self.batch.batch_completed
    }

    /// Index of the position being (or next to be) cut
    pub fn current_index(&self) -> usize {
        self.cursor
    }

    pub fn current_target(&self) -> Option<f32> {
        self.positions.get(self.cursor).copied()
    }

    fn apply_batch_request(&mut self) {
        self.batch.batch_size = self.requested_batch.max(1).min(self.remaining());
    }

    fn fire(&mut self, event: SequenceEvent) {
        let next = self.state.transition(event);
        debug!("sequence {} --{}--> {}", self.state, event, next);
        self.state = next;
        self.move_issued = false;
    }

    /// Replace the cut list with `count` evenly spaced fence positions
    ///
    /// `count` is capped at `MAX_CUT_POSITIONS`; a longer list is rejected
    /// with `TooManyPositions` and the current list is kept. Stored progress
    /// is reloaded and clamped to the new list.
    pub fn build_x_positions<S: ProgressStore>(
        &mut self,
        zero: f32,
        increment: f32,
        count: usize,
        store: &mut S,
    ) -> Result<(), SequenceError> {
        if self.state.is_active() {
            return Err(SequenceError::Busy);
        }
        if count > MAX_CUT_POSITIONS {
            return Err(SequenceError::TooManyPositions);
        }

        self.positions.clear();
        for i in 0..count {
            // Capacity checked above
            let _ = self.positions.push(zero + increment * i as f32);
        }
        self.cursor = 0;
        self.batch.last_completed = self.batch.last_completed.min(count as u32);
        if let Err(err) = self.load_position_state(store) {
            warn!("stored progress unavailable: {}", err);
        }
        self.apply_batch_request();
        info!("built {} positions from {} step {}", count, zero, increment);
        Ok(())
    }

    /// Request a batch size, returns the effective value
    ///
    /// Clamped to `[1, remaining]`, which is 0 when nothing remains. While a
    /// batch runs the new size replaces its quota, so a quota already met
    /// ends the batch at the next retract.
    pub fn set_batch_size(&mut self, size: u32) -> u32 {
        self.requested_batch = size;
        self.apply_batch_request();
        if self.state.is_active() {
            debug!("batch quota now {}", self.batch.batch_size);
        }
        self.batch.batch_size
    }

    /// Load persisted progress, clamped to the position list
    pub fn load_position_state<S: ProgressStore>(&mut self, store: &mut S) -> Result<u32, SequenceError> {
        let stored = store.load()?;
        let last = stored.min(self.total_cuts());
        if last != stored {
            warn!("stored progress {} clamped to {}", stored, last);
        }
        self.batch.last_completed = last;
        self.apply_batch_request();
        Ok(last)
    }

    pub fn save_position_state<S: ProgressStore>(&self, store: &mut S) -> Result<(), SequenceError> {
        store.save(self.batch.last_completed)?;
        Ok(())
    }

    pub fn clear_position_state<S: ProgressStore>(&mut self, store: &mut S) -> Result<(), SequenceError> {
        store.clear()?;
        self.batch.last_completed = 0;
        self.apply_batch_request();
        Ok(())
    }

    /// Return to the beginning of the list and forget persisted progress
    pub fn reset<S: ProgressStore>(&mut self, store: &mut S) -> Result<(), SequenceError> {
        if self.state.is_active() {
            return Err(SequenceError::Busy);
        }
        self.state = SequenceState::Idle;
        self.paused_from = None;
        self.cursor = 0;
        self.batch = BatchState::default();
        self.apply_batch_request();
        info!("sequence reset");
        store.clear()?;
        Ok(())
    }

    /// Check whether `start_batch_sequence` would succeed
    pub fn can_start(&self) -> Result<(), SequenceError> {
        if self.state != SequenceState::Idle {
            return Err(SequenceError::NotIdle);
        }
        if self.positions.is_empty() {
            return Err(SequenceError::NoPositions);
        }
        if self.batch.batch_size == 0 {
            return Err(SequenceError::InvalidBatchSize);
        }
        if self.remaining() == 0 {
            return Err(SequenceError::NothingRemaining);
        }
        Ok(())
    }

    /// Start cutting from the first uncut position
    pub fn start_batch_sequence(&mut self) -> Result<(), SequenceError> {
        self.can_start()?;
        self.batch.batch_size = self.batch.batch_size.min(self.remaining());
        self.batch.batch_start = self.batch.last_completed;
        self.batch.batch_completed = 0;
        self.cursor = self.batch.last_completed as usize;
        self.paused_from = None;
        self.fire(SequenceEvent::Start);
        info!(
            "batch of {} from cut {} of {}",
            self.batch.batch_size,
            self.cursor,
            self.total_cuts()
        );
        Ok(())
    }

    /// Advance the sequence; axis errors abort the batch
    pub fn update<D: ServoDriver, S: ProgressStore>(&mut self, io: &mut SequenceIo<'_, D, S>, now_ms: u32) {
        if let Err(err) = self.advance(io, now_ms) {
            error!("sequence fault in {}: {}", self.state, err);
            self.halt(io, now_ms);
        }
    }

    fn advance<D: ServoDriver, S: ProgressStore>(
        &mut self,
        io: &mut SequenceIo<'_, D, S>,
        now_ms: u32,
    ) -> Result<(), SequenceError> {
        let c = self.config;
        match self.state {
            SequenceState::MovingToRetract => {
                if io.y.approach(c.retract_y, c.y_velocity_scale, SEQUENCE_TOLERANCE, &mut self.move_issued)? {
                    self.fire(SequenceEvent::RetractReached);
                }
            }
            SequenceState::MovingToX => {
                let target = self.current_target().ok_or(SequenceError::NoPositions)?;
                if io.x.approach(target, c.x_velocity_scale, SEQUENCE_TOLERANCE, &mut self.move_issued)? {
                    self.fire(SequenceEvent::XReached);
                }
            }
            SequenceState::MovingToStart => {
                if io.y.approach(c.cut_start_y, c.y_velocity_scale, SEQUENCE_TOLERANCE, &mut self.move_issued)? {
                    io.y.set_torque_target(c.torque_target);
                    io.y.start_feed_to_stop(c.cut_stop_y, c.feed_velocity_scale, now_ms)?;
                    self.fire(SequenceEvent::StartReached);
                }
            }
            SequenceState::Cutting => {
                let feed = io.y.feed();
                if !feed.is_active() && !io.y.is_moving() {
                    let at_stop = feed.reached_target()
                        || within(io.y.position(), c.cut_stop_y, SEQUENCE_TOLERANCE);
                    if !at_stop {
                        return Err(SequenceError::CutInterrupted);
                    }
                    self.complete_cut(io.store);
                    self.fire(SequenceEvent::CutFinished);
                }
            }
            SequenceState::Retracting => {
                if io.y.approach(c.retract_y, c.y_velocity_scale, SEQUENCE_TOLERANCE, &mut self.move_issued)? {
                    let quota_met = self.batch.batch_completed >= self.batch.batch_size;
                    if quota_met || self.remaining() == 0 {
                        self.fire(SequenceEvent::BatchFinished);
                        info!(
                            "batch complete, {} of {} cut",
                            self.batch.last_completed,
                            self.total_cuts()
                        );
                    } else {
                        self.cursor = self.batch.last_completed as usize;
                        self.fire(SequenceEvent::NextPosition);
                    }
                }
            }
            SequenceState::Idle
            | SequenceState::Paused
            | SequenceState::Completed
            | SequenceState::Aborted => {}
        }
        Ok(())
    }

    fn complete_cut<S: ProgressStore>(&mut self, store: &mut S) {
        self.batch.last_completed = self.cursor as u32 + 1;
        self.batch.batch_completed += 1;
        info!(
            "cut {} done ({} of {} in batch)",
            self.batch.last_completed,
            self.batch.batch_completed,
            self.batch.batch_size
        );
        // A failed write must not stop the batch
        if let Err(err) = store.save(self.batch.last_completed) {
            error!("progress save failed: {}", err);
        }
    }

    /// Feed hold
    pub fn pause<D: ServoDriver, S>(&mut self, io: &mut SequenceIo<'_, D, S>) -> Result<(), SequenceError> {
        if !self.state.is_running() {
            return Err(SequenceError::NotRunning);
        }
        if self.state == SequenceState::Cutting {
            if io.y.feed().state() == FeedState::Feeding {
                io.y.pause_feed()?;
            }
        } else {
            io.x.stop();
            io.y.stop();
        }
        self.paused_from = Some(self.state);
        self.state = SequenceState::Paused;
        self.move_issued = false;
        info!("sequence paused");
        Ok(())
    }

    /// Continue from where the sequence was paused
    pub fn resume<D: ServoDriver, S>(
        &mut self,
        io: &mut SequenceIo<'_, D, S>,
        now_ms: u32,
    ) -> Result<(), SequenceError> {
        let Some(from) = self.paused_from.filter(|_| self.state == SequenceState::Paused) else {
            return Err(SequenceError::NotPaused);
        };
        if from == SequenceState::Cutting && io.y.feed().state() == FeedState::Paused {
            io.y.resume_feed(now_ms)?;
        }
        self.paused_from = None;
        self.state = from;
        self.move_issued = false;
        info!("sequence resumed in {}", from);
        Ok(())
    }

    /// Stop the batch; progress is kept
    pub fn abort<D: ServoDriver, S>(
        &mut self,
        io: &mut SequenceIo<'_, D, S>,
        now_ms: u32,
    ) -> Result<(), SequenceError> {
        if !self.state.is_active() {
            return Err(SequenceError::NotActive);
        }
        self.halt(io, now_ms);
        warn!("sequence aborted at cut {}", self.cursor);
        Ok(())
    }

    fn halt<D: ServoDriver, S>(&mut self, io: &mut SequenceIo<'_, D, S>, now_ms: u32) {
        if io.y.feed().is_active() {
            let _ = io.y.abort_feed(now_ms);
        } else {
            io.y.stop();
        }
        io.x.stop();
        self.paused_from = None;
        self.fire(SequenceEvent::Abort);
    }

    /// Return a completed or aborted sequence to idle
    pub fn acknowledge(&mut self) -> Result<(), SequenceError> {
        if !self.state.is_terminal() {
            return Err(SequenceError::NotFinished);
        }
        self.fire(SequenceEvent::Acknowledge);
        Ok(())
    }
}
