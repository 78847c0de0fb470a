//! Semi-automatic single-cut cycle
//!
//! The cycle parks the table at the cut start and waits. Each
//! `feed_to_stop()` runs one cut at the operator's feed rate and brings the
//! table back to where the cut began. Drive alerts during a cut park the
//! cycle in `Error`, which tries one automatic recovery after a dwell.

use crate::clock::{reached, since};
use crate::config::{CycleConfig, SequenceConfig};
use crate::motion::{within, ARRIVAL_TOLERANCE};
use crate::traits::{ServoDriver, SpindleDriver};

use super::{CycleContext, CycleError};

/// Semi-auto states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SemiState {
    Idle,
    MovingToRetract,
    MovingToStart,
    /// Dwell at the cut start before accepting a cut
    WaitingAtStart,
    /// Waiting for the operator
    Ready,
    /// Cutting toward the cut stop
    FeedingToStop,
    /// Returning to where the cut began
    Returning,
    /// Operator finished, table backing off
    Retracting,
    Paused,
    Complete,
    Canceled,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// Waiting out the dwell before trying to clear
    Waiting { since_ms: u32 },
    /// Alert clear in flight
    Clearing,
    /// Clear did not help, operator must reset
    Failed,
}

/// Slowest semi-auto feed; a zero rate would stall the table mid-cut
pub const MIN_SEMI_FEED_RATE_IPM: f32 = 1.0;

pub struct SemiAutoCycle {
    state: SemiState,
    paused_from: Option<SemiState>,
    recovery: Recovery,
    config: CycleConfig,
    retract_y: f32,
    cut_start_y: f32,
    cut_stop_y: f32,
    y_velocity_scale: f32,
    feed_rate_ipm: f32,
    start_position: f32,
    settle_until: u32,
    move_issued: bool,
}

impl SemiAutoCycle {
    pub fn new(config: &CycleConfig, sequence: &SequenceConfig) -> Self {
        Self {
            state: SemiState::Idle,
            paused_from: None,
            recovery: Recovery::Waiting { since_ms: 0 },
            config: *config,
            retract_y: sequence.retract_y,
            cut_start_y: sequence.cut_start_y,
            cut_stop_y: sequence.cut_stop_y,
            y_velocity_scale: sequence.y_velocity_scale,
            feed_rate_ipm: config.semi_feed_rate_ipm.max(MIN_SEMI_FEED_RATE_IPM),
            start_position: sequence.cut_start_y,
            settle_until: 0,
            move_issued: false,
        }
    }

    pub fn state(&self) -> SemiState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !matches!(
            self.state,
            SemiState::Idle | SemiState::Complete | SemiState::Canceled
        )
    }

    /// In `Error` with automatic recovery exhausted
    pub fn needs_reset(&self) -> bool {
        self.state == SemiState::Error && self.recovery == Recovery::Failed
    }

    pub fn feed_rate_ipm(&self) -> f32 {
        self.feed_rate_ipm
    }

    /// Table position the current cut started from
    pub fn start_position(&self) -> f32 {
        self.start_position
    }

    fn set_state(&mut self, next: SemiState) {
        if next != self.state {
            debug!("semi-auto {} -> {}", self.state, next);
            self.state = next;
            self.move_issued = false;
        }
    }

    fn feed_scale<D: ServoDriver, SP, S>(&self, ctx: &CycleContext<'_, D, SP, S>) -> f32 {
        ctx.y.drive().velocity_scale_for(self.feed_rate_ipm / 60.0)
    }

    /// Bring the table to the cut start
    pub fn start<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, _now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        if self.is_active() {
            return Err(CycleError::InvalidState);
        }
        if !ctx.motion_permitted {
            return Err(CycleError::Interlocked);
        }
        if ctx.sequence.is_active() {
            return Err(CycleError::InvalidState);
        }
        self.paused_from = None;
        info!("semi-auto starting");
        self.set_state(SemiState::MovingToRetract);
        Ok(())
    }

    /// Run one cut from the current position to the cut stop
    pub fn feed_to_stop<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        if self.state != SemiState::Ready {
            return Err(CycleError::InvalidState);
        }
        if !ctx.motion_permitted {
            return Err(CycleError::Interlocked);
        }
        if !ctx.spindle.is_running() {
            ctx.spindle.start()?;
        }
        let scale = self.feed_scale(ctx);
        self.start_position = ctx.y.position();
        if let Err(err) = ctx.y.move_to(self.cut_stop_y, scale) {
            ctx.spindle.stop();
            return Err(err.into());
        }
        self.set_state(SemiState::FeedingToStop);
        self.move_issued = true;
        info!(
            "semi-auto cut {} -> {} at {} ipm",
            self.start_position,
            self.cut_stop_y,
            self.feed_rate_ipm
        );
        Ok(())
    }

    /// Leave the cut start and retract; the cycle ends in `Complete`
    pub fn finish<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        if self.state != SemiState::Ready {
            return Err(CycleError::InvalidState);
        }
        if ctx.spindle.is_running() {
            ctx.spindle.stop();
        }
        self.set_state(SemiState::Retracting);
        Ok(())
    }

    /// Change the feed rate, applied at once to a cut in progress
    ///
    /// Rates below `MIN_SEMI_FEED_RATE_IPM` are raised to it. Returns the
    /// resulting fraction of max velocity.
    pub fn set_feed_rate<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, ipm: f32) -> f32
    where
        D: ServoDriver,
    {
        self.feed_rate_ipm = ipm.max(MIN_SEMI_FEED_RATE_IPM);
        let scale = self.feed_scale(ctx);
        if self.state == SemiState::FeedingToStop {
            ctx.y.set_velocity_scale(scale);
            debug!("semi-auto feed rate now {} ipm", self.feed_rate_ipm);
        }
        scale
    }

    pub fn pause<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>) -> Result<(), CycleError>
    where
        D: ServoDriver,
    {
        match self.state {
            SemiState::MovingToRetract
            | SemiState::MovingToStart
            | SemiState::WaitingAtStart
            | SemiState::FeedingToStop
            | SemiState::Returning
            | SemiState::Retracting => {
                ctx.y.stop();
                self.paused_from = Some(self.state);
                self.set_state(SemiState::Paused);
                info!("semi-auto paused");
                Ok(())
            }
            _ => Err(CycleError::InvalidState),
        }
    }

    pub fn resume<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
    {
        let Some(from) = self.paused_from.filter(|_| self.state == SemiState::Paused) else {
            return Err(CycleError::InvalidState);
        };
        if !ctx.motion_permitted {
            return Err(CycleError::Interlocked);
        }
        self.paused_from = None;
        if from == SemiState::WaitingAtStart {
            self.settle_until = now_ms.wrapping_add(self.config.start_settle_ms);
        }
        // The target is re-issued on the next update
        self.set_state(from);
        info!("semi-auto resumed in {}", from);
        Ok(())
    }

    /// Stop the table and spindle
    pub fn cancel<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>)
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        if !self.is_active() {
            return;
        }
        ctx.y.stop();
        ctx.spindle.stop();
        self.paused_from = None;
        info!("semi-auto canceled in {}", self.state);
        self.set_state(SemiState::Canceled);
    }

    /// Return to idle from any state, including an unrecovered error
    pub fn force_reset<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>)
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        ctx.y.stop();
        if ctx.spindle.is_running() {
            ctx.spindle.stop();
        }
        self.paused_from = None;
        warn!("semi-auto force reset from {}", self.state);
        self.set_state(SemiState::Idle);
    }

    fn enter_error<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32)
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        ctx.y.stop();
        ctx.spindle.stop();
        self.recovery = Recovery::Waiting { since_ms: now_ms };
        error!("semi-auto error in {}", self.state);
        self.set_state(SemiState::Error);
    }

    pub fn update<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32)
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        let result = match self.state {
            SemiState::Idle
            | SemiState::Ready
            | SemiState::Paused
            | SemiState::Complete
            | SemiState::Canceled => Ok(()),
            SemiState::MovingToRetract => self.travel(ctx, self.retract_y, SemiState::MovingToStart, now_ms),
            SemiState::MovingToStart => self.travel(ctx, self.cut_start_y, SemiState::WaitingAtStart, now_ms),
            SemiState::WaitingAtStart => {
                if reached(now_ms, self.settle_until) {
                    info!("semi-auto ready at {}", ctx.y.position());
                    self.set_state(SemiState::Ready);
                }
                Ok(())
            }
            SemiState::FeedingToStop => self.update_feeding(ctx, now_ms),
            SemiState::Returning => {
                if ctx.y.has_alerts() {
                    self.enter_error(ctx, now_ms);
                    return;
                }
                self.travel(ctx, self.start_position, SemiState::Ready, now_ms)
            }
            SemiState::Retracting => self.travel(ctx, self.retract_y, SemiState::Complete, now_ms),
            SemiState::Error => {
                self.update_recovery(ctx, now_ms);
                Ok(())
            }
        };

        if let Err(err) = result {
            error!("semi-auto move failed: {}", err);
            self.enter_error(ctx, now_ms);
        }
    }

    fn travel<D, SP, S>(
        &mut self,
        ctx: &mut CycleContext<'_, D, SP, S>,
        target: f32,
        next: SemiState,
        now_ms: u32,
    ) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        if ctx
            .y
            .approach(target, self.y_velocity_scale, ARRIVAL_TOLERANCE, &mut self.move_issued)?
        {
            match next {
                SemiState::WaitingAtStart => {
                    self.settle_until = now_ms.wrapping_add(self.config.start_settle_ms);
                }
                SemiState::Ready if self.state == SemiState::Returning => {
                    ctx.spindle.stop();
                    info!("semi-auto cut done");
                }
                SemiState::Complete => info!("semi-auto complete"),
                _ => {}
            }
            self.set_state(next);
        }
        Ok(())
    }

    fn update_feeding<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32) -> Result<(), CycleError>
    where
        D: ServoDriver,
        SP: SpindleDriver,
    {
        if ctx.y.has_alerts() {
            self.enter_error(ctx, now_ms);
            return Ok(());
        }
        if ctx.y.is_moving() {
            return Ok(());
        }
        if within(ctx.y.position(), self.cut_stop_y, ARRIVAL_TOLERANCE) {
            self.set_state(SemiState::Returning);
            return Ok(());
        }
        let scale = self.feed_scale(ctx);
        ctx.y.move_to(self.cut_stop_y, scale)?;
        Ok(())
    }

    fn update_recovery<D, SP, S>(&mut self, ctx: &mut CycleContext<'_, D, SP, S>, now_ms: u32)
    where
        D: ServoDriver,
    {
        match self.recovery {
            Recovery::Waiting { since_ms } => {
                if since(now_ms, since_ms) >= self.config.error_recovery_ms {
                    ctx.y.stop();
                    if ctx.y.clear_alerts(now_ms).is_err() {
                        self.recovery = Recovery::Failed;
                        return;
                    }
                    self.recovery = Recovery::Clearing;
                }
            }
            Recovery::Clearing => {
                if ctx.y.is_clearing_alerts() {
                    return;
                }
                if ctx.y.has_alerts() {
                    error!("semi-auto recovery failed, reset required");
                    self.recovery = Recovery::Failed;
                } else {
                    info!("semi-auto recovered");
                    self.set_state(SemiState::Ready);
                }
            }
            Recovery::Failed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ServoAlerts;
    use crate::testing::CycleRig;

    fn cycle() -> SemiAutoCycle {
        SemiAutoCycle::new(&CycleConfig::default(), &SequenceConfig::default())
    }

    fn run(rig: &mut CycleRig, cycle: &mut SemiAutoCycle, limit_ms: u32, until: SemiState) -> bool {
        rig.run_until(limit_ms, |r| {
            let now = r.now;
            cycle.update(&mut r.ctx(), now);
            cycle.state() == until
        })
    }

    fn ready(rig: &mut CycleRig) -> SemiAutoCycle {
        let mut cycle = cycle();
        let now = rig.now;
        cycle.start(&mut rig.ctx(), now).unwrap();
        assert!(run(rig, &mut cycle, 10_000, SemiState::Ready));
        cycle
    }

    #[test]
    fn test_start_parks_at_cut_start() {
        let mut rig = CycleRig::new();
        let mut cycle = cycle();
        let now = rig.now;
        cycle.start(&mut rig.ctx(), now).unwrap();
        assert_eq!(cycle.state(), SemiState::MovingToRetract);
        assert!(run(&mut rig, &mut cycle, 10_000, SemiState::WaitingAtStart));
        let arrived = rig.now;
        assert!(run(&mut rig, &mut cycle, 1_000, SemiState::Ready));
        assert!(rig.now - arrived >= 200);
        assert!(within(rig.y.position(), 1.0, ARRIVAL_TOLERANCE));
        assert!(!rig.spindle.running);
    }

    #[test]
    fn test_single_cut_returns_to_start() {
        let mut rig = CycleRig::new();
        let mut cycle = ready(&mut rig);
        cycle.set_feed_rate(&mut rig.ctx(), 240.0);

        cycle.feed_to_stop(&mut rig.ctx()).unwrap();
        assert_eq!(cycle.state(), SemiState::FeedingToStop);
        assert!(rig.spindle.running);
        assert!(within(cycle.start_position(), 1.0, ARRIVAL_TOLERANCE));

        let mut reached_stop = false;
        assert!(rig.run_until(30_000, |r| {
            let now = r.now;
            cycle.update(&mut r.ctx(), now);
            reached_stop |= within(r.y.position(), 10.0, ARRIVAL_TOLERANCE);
            cycle.state() == SemiState::Ready
        }));
        assert!(reached_stop);
        assert!(!rig.spindle.running);
        assert!(within(rig.y.position(), 1.0, ARRIVAL_TOLERANCE));

        cycle.finish(&mut rig.ctx()).unwrap();
        assert!(run(&mut rig, &mut cycle, 10_000, SemiState::Complete));
        assert!(within(rig.y.position(), 0.0, ARRIVAL_TOLERANCE));
        assert!(!cycle.is_active());
    }

    #[test]
    fn test_feed_to_stop_only_from_ready() {
        let mut rig = CycleRig::new();
        let mut cycle = cycle();
        assert_eq!(cycle.feed_to_stop(&mut rig.ctx()), Err(CycleError::InvalidState));
        assert_eq!(cycle.finish(&mut rig.ctx()), Err(CycleError::InvalidState));
        assert_eq!(rig.spindle.starts, 0);
    }

    #[test]
    fn test_feed_rate_applies_live() {
        let mut rig = CycleRig::new();
        let mut cycle = ready(&mut rig);
        cycle.feed_to_stop(&mut rig.ctx()).unwrap();
        // 20 ipm on a 4000 steps/in table
        assert_eq!(rig.y.driver().max_velocity, 1_333);

        let scale = cycle.set_feed_rate(&mut rig.ctx(), 120.0);
        assert!(within(scale, 0.25, 1e-6));
        assert_eq!(rig.y.driver().max_velocity, 8_000);
        assert_eq!(cycle.state(), SemiState::FeedingToStop);
    }

    #[test]
    fn test_zero_feed_rate_keeps_table_moving() {
        let mut rig = CycleRig::new();
        let mut cycle = ready(&mut rig);
        cycle.feed_to_stop(&mut rig.ctx()).unwrap();

        let scale = cycle.set_feed_rate(&mut rig.ctx(), 0.0);
        assert!(scale > 0.0);
        assert_eq!(cycle.feed_rate_ipm(), MIN_SEMI_FEED_RATE_IPM);
        // 1 ipm on a 4000 steps/in table
        assert_eq!(rig.y.driver().max_velocity, 66);

        let from = rig.y.position();
        rig.run_until(3_000, |r| {
            let now = r.now;
            cycle.update(&mut r.ctx(), now);
            false
        });
        assert!(rig.y.position() > from);
        assert_eq!(cycle.state(), SemiState::FeedingToStop);
    }

    #[test]
    fn test_alert_during_cut_recovers() {
        let mut rig = CycleRig::new();
        let mut cycle = ready(&mut rig);
        cycle.feed_to_stop(&mut rig.ctx()).unwrap();
        rig.y.driver_mut().alerts = ServoAlerts {
            following_error: true,
            ..ServoAlerts::NONE
        };
        assert!(run(&mut rig, &mut cycle, 100, SemiState::Error));
        assert!(!rig.spindle.running);
        assert!(!rig.y.is_moving());

        let errored = rig.now;
        assert!(run(&mut rig, &mut cycle, 6_000, SemiState::Ready));
        assert!(rig.now - errored >= 5_000);
        assert!(!rig.y.has_alerts());
    }

    #[test]
    fn test_fault_recovery_cycles_enable() {
        let mut rig = CycleRig::new();
        let mut cycle = ready(&mut rig);
        cycle.feed_to_stop(&mut rig.ctx()).unwrap();
        rig.y.driver_mut().alerts = ServoAlerts {
            motor_faulted: true,
            ..ServoAlerts::NONE
        };
        assert!(run(&mut rig, &mut cycle, 100, SemiState::Error));
        assert!(run(&mut rig, &mut cycle, 6_000, SemiState::Ready));
        assert!(rig.y.driver().enabled);
    }

    #[test]
    fn test_unrecoverable_alert_needs_reset() {
        let mut rig = CycleRig::new();
        let mut cycle = ready(&mut rig);
        cycle.feed_to_stop(&mut rig.ctx()).unwrap();
        rig.y.driver_mut().sticky = true;
        rig.y.driver_mut().alerts = ServoAlerts {
            following_error: true,
            ..ServoAlerts::NONE
        };
        assert!(run(&mut rig, &mut cycle, 100, SemiState::Error));
        assert!(!run(&mut rig, &mut cycle, 8_000, SemiState::Ready));
        assert!(cycle.needs_reset());

        cycle.force_reset(&mut rig.ctx());
        assert_eq!(cycle.state(), SemiState::Idle);
        assert!(!cycle.needs_reset());
    }

    #[test]
    fn test_pause_and_resume_mid_cut() {
        let mut rig = CycleRig::new();
        let mut cycle = ready(&mut rig);
        cycle.set_feed_rate(&mut rig.ctx(), 240.0);
        cycle.feed_to_stop(&mut rig.ctx()).unwrap();
        for _ in 0..20 {
            rig.tick_with(|r| {
                let now = r.now;
                cycle.update(&mut r.ctx(), now);
            });
        }

        cycle.pause(&mut rig.ctx()).unwrap();
        assert_eq!(cycle.state(), SemiState::Paused);
        let held = rig.y.position();
        assert!(held > 1.0 && held < 10.0);
        assert!(rig.spindle.running);

        let now = rig.now;
        rig.permitted = false;
        assert_eq!(cycle.resume(&mut rig.ctx(), now), Err(CycleError::Interlocked));
        rig.permitted = true;
        cycle.resume(&mut rig.ctx(), now).unwrap();
        assert_eq!(cycle.state(), SemiState::FeedingToStop);
        assert!(run(&mut rig, &mut cycle, 30_000, SemiState::Ready));
        assert!(within(rig.y.position(), 1.0, ARRIVAL_TOLERANCE));
    }

    #[test]
    fn test_cancel_stops_everything() {
        let mut rig = CycleRig::new();
        let mut cycle = ready(&mut rig);
        cycle.feed_to_stop(&mut rig.ctx()).unwrap();
        cycle.cancel(&mut rig.ctx());
        assert_eq!(cycle.state(), SemiState::Canceled);
        assert!(!rig.spindle.running);
        assert!(!rig.y.is_moving());
        assert!(!cycle.is_active());

        let now = rig.now;
        cycle.start(&mut rig.ctx(), now).unwrap();
        assert_eq!(cycle.state(), SemiState::MovingToRetract);
    }
}
