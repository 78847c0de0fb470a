//! Operator-facing cut cycles
//!
//! Two coordinators share one command surface: `AutoCut` runs a whole
//! batch through the sequence controller, `SemiAuto` lets the operator
//! trigger each cut by hand. [`Cycle`] dispatches to whichever is selected.

pub mod auto;
pub mod semi;

pub use auto::{AutoCutCycle, AutoState};
pub use semi::{SemiAutoCycle, SemiState, MIN_SEMI_FEED_RATE_IPM};

use crate::axis::{AxisController, AxisError};
use crate::config::{CycleConfig, SequenceConfig};
use crate::sequence::{CutSequenceController, SequenceError, SequenceIo};
use crate::traits::{ProgressStore, ServoDriver, SpindleDriver, SpindleError};

/// Cycle variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleKind {
    AutoCut,
    SemiAuto,
}

/// Cycle command errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleError {
    /// Command not valid in the current state
    InvalidState,
    /// Safety chain is open
    Interlocked,
    /// Command belongs to the other cycle variant
    WrongCycle,
    Spindle(SpindleError),
    Sequence(SequenceError),
    Axis(AxisError),
}

impl From<SpindleError> for CycleError {
    fn from(err: SpindleError) -> Self {
        CycleError::Spindle(err)
    }
}

impl From<SequenceError> for CycleError {
    fn from(err: SequenceError) -> Self {
        CycleError::Sequence(err)
    }
}

impl From<AxisError> for CycleError {
    fn from(err: AxisError) -> Self {
        CycleError::Axis(err)
    }
}

/// Everything a cycle touches during one call
pub struct CycleContext<'a, D, SP, S> {
    pub x: &'a mut AxisController<D>,
    pub y: &'a mut AxisController<D>,
    pub sequence: &'a mut CutSequenceController,
    pub spindle: &'a mut SP,
    pub store: &'a mut S,
    /// Safety relay engaged
    pub motion_permitted: bool,
}

impl<'a, D, SP, S> CycleContext<'a, D, SP, S> {
    /// Split into the sequence controller and the I/O it drives
    pub fn sequence_io(&mut self) -> (&mut CutSequenceController, SequenceIo<'_, D, S>) {
        (
            &mut *self.sequence,
            SequenceIo {
                x: &mut *self.x,
                y: &mut *self.y,
                store: &mut *self.store,
            },
        )
    }
}

/// Cycle status for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleStatus {
    AutoCut(AutoState),
    SemiAuto(SemiState),
}

/// The selected cycle coordinator
pub enum Cycle {
    AutoCut(AutoCutCycle),
    SemiAuto(SemiAutoCycle),
}

impl Cycle {
    pub fn new(kind: CycleKind, config: &CycleConfig, sequence: &SequenceConfig) -> Self {
        match kind {
            CycleKind::AutoCut => Cycle::AutoCut(AutoCutCycle::new(config, sequence)),
            CycleKind::SemiAuto => Cycle::SemiAuto(SemiAutoCycle::new(config, sequence)),
        }
    }

    pub fn kind(&self) -> CycleKind {
        match self {
            Cycle::AutoCut(_) => CycleKind::AutoCut,
            Cycle::SemiAuto(_) => CycleKind::SemiAuto,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Cycle::AutoCut(c) => c.is_active(),
            Cycle::SemiAuto(c) => c.is_active(),
        }
    }

    pub fn status(&self) -> CycleStatus {
        match self {
            Cycle::AutoCut(c) => CycleStatus::AutoCut(c.state()),
            Cycle::SemiAuto(c) => CycleStatus::SemiAuto(c.state()),
        }
    }

    pub fn start<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self {
            Cycle::AutoCut(c) => c.start(ctx, now_ms),
            Cycle::SemiAuto(c) => c.start(ctx, now_ms),
        }
    }

    pub fn pause<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self {
            Cycle::AutoCut(c) => c.pause(ctx),
            Cycle::SemiAuto(c) => c.pause(ctx),
        }
    }

    pub fn resume<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self {
            Cycle::AutoCut(c) => c.resume(ctx, now_ms),
            Cycle::SemiAuto(c) => c.resume(ctx, now_ms),
        }
    }

    /// Stop whatever is running and return to idle (or canceled)
    pub fn cancel<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32)
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self {
            Cycle::AutoCut(c) => c.cancel(ctx, now_ms),
            Cycle::SemiAuto(c) => c.cancel(ctx),
        }
    }

    pub fn update<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32)
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self {
            Cycle::AutoCut(c) => c.update(ctx, now_ms),
            Cycle::SemiAuto(c) => c.update(ctx, now_ms),
        }
    }

    /// Auto-cut feed hold toggle
    pub fn feed_hold<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self {
            Cycle::AutoCut(c) => c.feed_hold(ctx, now_ms),
            Cycle::SemiAuto(_) => Err(CycleError::WrongCycle),
        }
    }

    pub fn exit_feed_hold<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self {
            Cycle::AutoCut(c) => c.exit_feed_hold(ctx, now_ms),
            Cycle::SemiAuto(_) => Err(CycleError::WrongCycle),
        }
    }

    pub fn feed_to_stop<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        match self {
            Cycle::SemiAuto(c) => c.feed_to_stop(ctx),
            Cycle::AutoCut(_) => Err(CycleError::WrongCycle),
        }
    }

    pub fn finish<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        match self {
            Cycle::SemiAuto(c) => c.finish(ctx),
            Cycle::AutoCut(_) => Err(CycleError::WrongCycle),
        }
    }

    pub fn force_reset<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32)
    where
        D: ServoDriver,
        SP: SpindleDriver,
        S: ProgressStore,
    {
        match self {
            Cycle::SemiAuto(c) => c.force_reset(ctx),
            Cycle::AutoCut(c) => c.cancel(ctx, now_ms),
        }
    }

    /// Semi-auto feed rate in inches per minute
    pub fn set_feed_rate<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, ipm: f32) -> Result<f32, CycleError>
    where
        D: ServoDriver,
    {
        match self {
            Cycle::SemiAuto(c) => Ok(c.set_feed_rate(ctx, ipm)),
            Cycle::AutoCut(_) => Err(CycleError::WrongCycle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CycleRig;

    #[test]
    fn test_dispatch_by_kind() {
        let config = CycleConfig::default();
        let sequence = SequenceConfig::default();
        let auto = Cycle::new(CycleKind::AutoCut, &config, &sequence);
        assert_eq!(auto.kind(), CycleKind::AutoCut);
        assert_eq!(auto.status(), CycleStatus::AutoCut(AutoState::Idle));
        assert!(!auto.is_active());

        let semi = Cycle::new(CycleKind::SemiAuto, &config, &sequence);
        assert_eq!(semi.kind(), CycleKind::SemiAuto);
        assert_eq!(semi.status(), CycleStatus::SemiAuto(SemiState::Idle));
    }

    #[test]
    fn test_variant_commands_rejected_on_other_cycle() {
        let mut rig = CycleRig::new();
        let config = CycleConfig::default();
        let sequence = SequenceConfig::default();
        let mut auto = Cycle::new(CycleKind::AutoCut, &config, &sequence);
        assert_eq!(auto.feed_to_stop(&mut rig.ctx()), Err(CycleError::WrongCycle));
        assert_eq!(auto.set_feed_rate(&mut rig.ctx(), 10.0), Err(CycleError::WrongCycle));

        let mut semi = Cycle::new(CycleKind::SemiAuto, &config, &sequence);
        let now = rig.now;
        assert_eq!(semi.feed_hold(&mut rig.ctx(), now), Err(CycleError::WrongCycle));
        assert_eq!(semi.exit_feed_hold(&mut rig.ctx(), now), Err(CycleError::WrongCycle));
    }

    #[test]
    fn test_semi_start_refused_while_batch_active() {
        let mut rig = CycleRig::new();
        rig.build(2.0, 1.0, 2);
        rig.sequence.start_batch_sequence().unwrap();
        let mut semi = Cycle::new(
            CycleKind::SemiAuto,
            &CycleConfig::default(),
            &SequenceConfig::default(),
        );
        let now = rig.now;
        assert_eq!(semi.start(&mut rig.ctx(), now), Err(CycleError::InvalidState));
        assert!(!semi.is_active());
    }
}
