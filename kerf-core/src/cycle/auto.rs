//! Automatic batch cycle
//!
//! Spins the blade up, runs one batch through the sequence controller and
//! stops the blade when the batch ends. The user-visible state is a coarse
//! mirror of the sequence state.

use crate::clock::reached;
use crate::config::{CycleConfig, SequenceConfig};
use crate::motion::SEQUENCE_TOLERANCE;
use crate::sequence::SequenceState;
use crate::traits::{ProgressStore, ServoDriver, SpindleDriver, SpindleError};

use super::{CycleContext, CycleError};

/// Auto-cut states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutoState {
    Idle,
    /// Spindle start requested
    SpindleStart,
    /// Blade spinning up
    WaitForSpindle,
    /// Axes moving between cuts
    Positioning,
    Cutting,
    Retracting,
    /// Feed hold
    Paused,
    /// Batch finished, spindle stopped
    Complete,
    /// Feed hold abandoned, table retracting
    ExitingHold,
}

pub struct AutoCutCycle {
    state: AutoState,
    spindle_settle_ms: u32,
    retract_y: f32,
    y_velocity_scale: f32,
    settle_until: u32,
    move_issued: bool,
}

impl AutoCutCycle {
    pub fn new(config: &CycleConfig, sequence: &SequenceConfig) -> Self {
        Self {
            state: AutoState::Idle,
            spindle_settle_ms: config.spindle_settle_ms,
            retract_y: sequence.retract_y,
            y_velocity_scale: sequence.y_velocity_scale,
            settle_until: 0,
            move_issued: false,
        }
    }

    pub fn state(&self) -> AutoState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, AutoState::Idle | AutoState::Complete)
    }

    pub fn is_paused(&self) -> bool {
        self.state == AutoState::Paused
    }

    fn set_state(&mut self, next: AutoState) {
        if next != self.state {
            debug!("auto-cut {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Begin a batch: spindle first, then the sequence
    pub fn start<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, _now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        if self.is_active() {
            return Err(CycleError::InvalidState);
        }
        if !ctx.motion_permitted {
            return Err(CycleError::Interlocked);
        }
        if ctx.sequence.state().is_terminal() {
            ctx.sequence.acknowledge()?;
        }
        ctx.sequence.can_start()?;
        info!("auto-cut starting");
        self.set_state(AutoState::SpindleStart);
        Ok(())
    }

    /// Feed hold
    pub fn pause<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        if !matches!(
            self.state,
            AutoState::Positioning | AutoState::Cutting | AutoState::Retracting
        ) {
            return Err(CycleError::InvalidState);
        }
        let (sequence, mut io) = ctx.sequence_io();
        sequence.pause(&mut io)?;
        self.set_state(AutoState::Paused);
        Ok(())
    }

    pub fn resume<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        if self.state != AutoState::Paused {
            return Err(CycleError::InvalidState);
        }
        if !ctx.motion_permitted {
            return Err(CycleError::Interlocked);
        }
        let (sequence, mut io) = ctx.sequence_io();
        sequence.resume(&mut io, now_ms)?;
        let mirrored = Self::mirror(sequence.state());
        self.set_state(mirrored);
        Ok(())
    }

    /// Toggle between paused and running
    pub fn feed_hold<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        if self.state == AutoState::Paused {
            self.resume(ctx, now_ms)
        } else {
            self.pause(ctx)
        }
    }

    /// Abandon a held batch and pull the table back to retract
    ///
    /// Completed cuts stay recorded; the next start resumes after them.
    pub fn exit_feed_hold<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        if self.state != AutoState::Paused {
            return Err(CycleError::InvalidState);
        }
        {
            let (sequence, mut io) = ctx.sequence_io();
            sequence.abort(&mut io, now_ms)?;
            sequence.acknowledge()?;
        }
        self.move_issued = false;
        self.set_state(AutoState::ExitingHold);
        info!("feed hold exited, retracting");
        Ok(())
    }

    /// Stop everything and return to idle; always succeeds
    pub fn cancel<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32)
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        if ctx.sequence.is_active() {
            let (sequence, mut io) = ctx.sequence_io();
            let _ = sequence.abort(&mut io, now_ms);
        }
        if ctx.sequence.state().is_terminal() {
            let _ = ctx.sequence.acknowledge();
        }
        if self.state == AutoState::ExitingHold {
            ctx.y.stop();
        }
        if ctx.spindle.is_running() {
            ctx.spindle.stop();
        }
        if self.state != AutoState::Idle {
            info!("auto-cut canceled in {}", self.state);
        }
        self.set_state(AutoState::Idle);
    }

    pub fn update<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32)
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self.state {
            AutoState::Idle | AutoState::Complete | AutoState::Paused => {}
            AutoState::SpindleStart if !ctx.motion_permitted => {
                warn!("spindle start blocked by safety relay");
                self.set_state(AutoState::Idle);
            }
            AutoState::SpindleStart => match ctx.spindle.start() {
                Ok(()) => {
                    self.settle_until = now_ms.wrapping_add(self.spindle_settle_ms);
                    self.set_state(AutoState::WaitForSpindle);
                }
                // Contactor still inside its switch interval, try next tick
                Err(SpindleError::SwitchTooFast) => {}
                Err(err) => {
                    error!("spindle refused to start: {}", err);
                    self.set_state(AutoState::Idle);
                }
            },
            AutoState::WaitForSpindle => {
                if reached(now_ms, self.settle_until) {
                    match ctx.sequence.start_batch_sequence() {
                        Ok(()) => self.set_state(AutoState::Positioning),
                        Err(err) => {
                            error!("batch start failed: {}", err);
                            ctx.spindle.stop();
                            self.set_state(AutoState::Idle);
                        }
                    }
                }
            }
            AutoState::Positioning | AutoState::Cutting | AutoState::Retracting => {
                let (sequence, mut io) = ctx.sequence_io();
                sequence.update(&mut io, now_ms);
                self.follow_sequence(ctx);
            }
            AutoState::ExitingHold => {
                match ctx
                    .y
                    .approach(self.retract_y, self.y_velocity_scale, SEQUENCE_TOLERANCE, &mut self.move_issued)
                {
                    Ok(false) => {}
                    Ok(true) => {
                        ctx.spindle.stop();
                        self.set_state(AutoState::Idle);
                    }
                    Err(err) => {
                        error!("retract after feed hold failed: {}", err);
                        ctx.y.stop();
                        ctx.spindle.stop();
                        self.set_state(AutoState::Idle);
                    }
                }
            }
        }
    }

    fn follow_sequence<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>)
    where
        SP: SpindleDriver,
    {
        match ctx.sequence.state() {
            SequenceState::Completed => {
                ctx.spindle.stop();
                let _ = ctx.sequence.acknowledge();
                info!("auto-cut complete");
                self.set_state(AutoState::Complete);
            }
            SequenceState::Aborted | SequenceState::Idle => {
                ctx.spindle.stop();
                let _ = ctx.sequence.acknowledge();
                warn!("auto-cut ended by sequence abort");
                self.set_state(AutoState::Idle);
            }
            state => self.set_state(Self::mirror(state)),
        }
    }

    fn mirror(state: SequenceState) -> AutoState {
        match state {
            SequenceState::Cutting => AutoState::Cutting,
            SequenceState::Retracting => AutoState::Retracting,
            SequenceState::Paused => AutoState::Paused,
            SequenceState::Completed => AutoState::Complete,
            SequenceState::Idle | SequenceState::Aborted => AutoState::Idle,
            SequenceState::MovingToRetract | SequenceState::MovingToX | SequenceState::MovingToStart => {
                AutoState::Positioning
            }
        }
    }
}
