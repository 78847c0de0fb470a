//! Torque feed controller
//!
//! Runs the axis in velocity mode toward a target. Each control step the
//! averaged torque is compared against the target torque and the PID output
//! nudges the feed rate, which is kept inside `[min_feed_rate, ceiling]`
//! where the ceiling is the rate the caller asked for.
//!
//! All timed behavior (ramp windows, retract speed steps, resume steps,
//! acceleration restore) is expressed as deadlines checked from `update()`.

use crate::clock::{reached, since};
use crate::config::FeedConfig;
use crate::motion::{fabs, within, ARRIVAL_TOLERANCE, FEED_TARGET_TOLERANCE};
use crate::traits::ServoDriver;

use crate::axis::AxisDrive;

use super::filter::TorqueFilter;
use super::pid::{Pid, PidCoefficients};

/// Accepted torque target range (% of peak)
pub const TORQUE_TARGET_RANGE: (f32, f32) = (1.0, 95.0);

/// Accepted acceleration factor range
pub const ACCEL_FACTOR_RANGE: (f32, f32) = (0.2, 2.0);

/// Feed controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeedState {
    Idle,
    Feeding,
    /// Settling at the target, then returning to the start
    Retracting,
    /// Feed hold, resumable
    Paused,
}

/// Feed errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeedError {
    /// A feed is already running
    Busy,
    /// Operation requires an active feed
    NotFeeding,
    /// Operation requires a paused feed
    NotPaused,
    /// Target lies outside the axis travel
    OutOfTravel,
    /// Axis already sits on the target
    AtTarget,
}

/// Snapshot for status reporting
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeedDiagnostics {
    pub state: FeedState,
    pub torque_target: f32,
    pub torque_average: f32,
    pub feed_rate: f32,
    pub commanded_sps: i32,
    pub integral: f32,
    pub target: f32,
    pub retract_to: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RetractPhase {
    /// Waiting for the axis to come to rest at the target
    Settle { until_ms: u32 },
    /// Returning while stepping up through the retract profile
    Ramp { step: usize, next_ms: u32 },
    /// At full retract speed, waiting for arrival
    Return,
}

#[derive(Debug, Clone)]
pub struct TorqueFeedController {
    config: FeedConfig,
    state: FeedState,
    torque_target: f32,
    feed_rate: f32,
    ceiling: f32,
    accel_factor: f32,
    direction: f32,
    target: f32,
    retract_to: f32,
    retract_enabled: bool,
    reached_target: bool,
    pid: Pid,
    filter: TorqueFilter,
    last_tick_ms: u32,
    last_issue_ms: u32,
    issued_rate: f32,
    commanded_sps: i32,
    ramp_until: Option<u32>,
    resume_step_at: Option<u32>,
    retract: RetractPhase,
    accel_restore_at: Option<u32>,
    restore_accel_now: bool,
}

impl TorqueFeedController {
    pub fn new(config: &FeedConfig) -> Self {
        let mut config = *config;
        config.min_feed_rate = config.min_feed_rate.clamp(0.0, 1.0);
        config.max_feed_rate = config.max_feed_rate.clamp(config.min_feed_rate, 1.0);

        Self {
            state: FeedState::Idle,
            torque_target: config
                .default_torque_target
                .clamp(TORQUE_TARGET_RANGE.0, TORQUE_TARGET_RANGE.1),
            feed_rate: config.min_feed_rate,
            ceiling: config.max_feed_rate,
            accel_factor: 1.0,
            direction: 1.0,
            target: 0.0,
            retract_to: 0.0,
            retract_enabled: config.auto_retract,
            reached_target: false,
            pid: Pid::new(PidCoefficients::from_config(&config), config.integral_limit),
            filter: TorqueFilter::new(config.torque_window_ms),
            last_tick_ms: 0,
            last_issue_ms: 0,
            issued_rate: 0.0,
            commanded_sps: 0,
            ramp_until: None,
            resume_step_at: None,
            retract: RetractPhase::Return,
            accel_restore_at: None,
            restore_accel_now: false,
            config,
        }
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Feeding, paused, or finishing a retract
    pub fn is_active(&self) -> bool {
        self.state != FeedState::Idle
    }

    pub fn torque_target(&self) -> f32 {
        self.torque_target
    }

    /// Moving average of the measured torque
    pub fn smoothed_torque(&self) -> f32 {
        self.filter.average()
    }

    /// Torque error of the last PID step, zero before the first one
    pub fn last_error(&self) -> f32 {
        self.pid.last_error().unwrap_or(0.0)
    }

    pub fn feed_rate(&self) -> f32 {
        self.feed_rate
    }

    /// Feed rate ceiling of the current (or last) feed
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Last velocity sent to the drive (steps/s), 0 when stopped
    pub fn commanded_velocity(&self) -> i32 {
        self.commanded_sps
    }

    pub fn accel_factor(&self) -> f32 {
        self.accel_factor
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// True once the last feed arrived at its target
    pub fn reached_target(&self) -> bool {
        self.reached_target
    }

    /// Whether the drive is currently running on a reduced acceleration
    pub fn in_reduced_accel(&self) -> bool {
        self.ramp_until.is_some() || self.state == FeedState::Paused || self.accel_restore_at.is_some()
    }

    pub fn diagnostics(&self) -> FeedDiagnostics {
        FeedDiagnostics {
            state: self.state,
            torque_target: self.torque_target,
            torque_average: self.filter.average(),
            feed_rate: self.feed_rate,
            commanded_sps: self.commanded_sps,
            integral: self.pid.integral(),
            target: self.target,
            retract_to: self.retract_to,
        }
    }

    /// Set the torque target, returns the clamped value
    pub fn set_torque_target(&mut self, percent: f32) -> f32 {
        self.torque_target = percent.clamp(TORQUE_TARGET_RANGE.0, TORQUE_TARGET_RANGE.1);
        self.torque_target
    }

    /// Override the feed rate, returns the clamped value
    pub fn set_feed_rate(&mut self, rate: f32) -> f32 {
        let upper = if self.is_active() {
            self.ceiling
        } else {
            self.config.max_feed_rate
        };
        self.feed_rate = rate.clamp(self.config.min_feed_rate, upper);
        self.feed_rate
    }

    /// Set the normal acceleration factor, returns the clamped value
    pub fn set_accel_factor(&mut self, factor: f32) -> f32 {
        self.accel_factor = factor.clamp(ACCEL_FACTOR_RANGE.0, ACCEL_FACTOR_RANGE.1);
        self.accel_factor
    }

    /// Start a torque feed to `target`, retracting afterwards if configured
    pub fn start<D: ServoDriver>(
        &mut self,
        drive: &mut AxisDrive<D>,
        target: f32,
        scale: f32,
        now_ms: u32,
    ) -> Result<(), FeedError> {
        let retract = self.config.auto_retract;
        self.begin(drive, target, scale, retract, now_ms)
    }

    /// Start a torque feed to `target` that stops there without retracting
    pub fn start_to_stop<D: ServoDriver>(
        &mut self,
        drive: &mut AxisDrive<D>,
        target: f32,
        scale: f32,
        now_ms: u32,
    ) -> Result<(), FeedError> {
        self.begin(drive, target, scale, false, now_ms)
    }

    fn begin<D: ServoDriver>(
        &mut self,
        drive: &mut AxisDrive<D>,
        target: f32,
        scale: f32,
        retract: bool,
        now_ms: u32,
    ) -> Result<(), FeedError> {
        if self.is_active() {
            return Err(FeedError::Busy);
        }
        if !drive.limits().in_travel(target) {
            return Err(FeedError::OutOfTravel);
        }
        let start = drive.position();
        if within(start, target, FEED_TARGET_TOLERANCE) {
            return Err(FeedError::AtTarget);
        }

        let min = self.config.min_feed_rate;
        self.direction = if target > start { 1.0 } else { -1.0 };
        self.target = target;
        self.retract_to = start;
        self.retract_enabled = retract;
        self.reached_target = false;
        self.ceiling = scale.clamp(min, self.config.max_feed_rate);
        self.feed_rate = (self.ceiling * self.config.initial_velocity_fraction).clamp(min, self.ceiling);
        self.pid.reset();
        self.filter.clear();
        self.accel_restore_at = None;
        self.restore_accel_now = false;

        drive.set_accel_factor(self.accel_factor * self.config.ramp_accel_factor);
        self.ramp_until = Some(now_ms.wrapping_add(self.config.ramp_window_ms));
        self.resume_step_at = None;
        self.last_tick_ms = now_ms;
        self.state = FeedState::Feeding;
        self.issue(drive, self.feed_rate, now_ms);

        info!(
            "feed start {} -> {} ceiling {} torque {}",
            start,
            target,
            self.ceiling,
            self.torque_target
        );
        Ok(())
    }

    fn issue<D: ServoDriver>(&mut self, drive: &mut AxisDrive<D>, rate: f32, now_ms: u32) {
        self.commanded_sps = drive.run_velocity(self.direction * rate);
        self.issued_rate = rate;
        self.last_issue_ms = now_ms;
    }

    fn passed_target(&self, position: f32) -> bool {
        if self.direction > 0.0 {
            position >= self.target - FEED_TARGET_TOLERANCE
        } else {
            position <= self.target + FEED_TARGET_TOLERANCE
        }
    }

    /// Advance the controller
    pub fn update<D: ServoDriver>(&mut self, drive: &mut AxisDrive<D>, now_ms: u32) {
        let restore_due = self.accel_restore_at.is_some_and(|at| reached(now_ms, at));
        if self.restore_accel_now || restore_due {
            drive.set_accel_factor(self.accel_factor);
            self.restore_accel_now = false;
            self.accel_restore_at = None;
        }

        match self.state {
            FeedState::Feeding => self.update_feeding(drive, now_ms),
            FeedState::Retracting => self.update_retract(drive, now_ms),
            FeedState::Idle | FeedState::Paused => {}
        }
    }

    fn update_feeding<D: ServoDriver>(&mut self, drive: &mut AxisDrive<D>, now_ms: u32) {
        self.filter.push(now_ms, drive.torque_percent());

        let position = drive.position();
        if self.passed_target(position) {
            drive.driver_mut().stop_decelerate();
            drive.set_accel_factor(self.accel_factor);
            self.commanded_sps = 0;
            self.reached_target = true;
            self.ramp_until = None;
            self.resume_step_at = None;
            self.state = FeedState::Retracting;
            self.retract = RetractPhase::Settle {
                until_ms: now_ms.wrapping_add(self.config.settle_ms),
            };
            info!("feed reached {} at {}", self.target, position);
            return;
        }

        if let Some(at) = self.resume_step_at {
            if reached(now_ms, at) {
                self.resume_step_at = None;
                self.issue(drive, self.feed_rate, now_ms);
            }
        }
        if let Some(until) = self.ramp_until {
            if reached(now_ms, until) {
                self.ramp_until = None;
                drive.set_accel_factor(self.accel_factor);
            }
        }

        let dt = since(now_ms, self.last_tick_ms) as f32 / 1000.0;
        if dt < self.config.min_dt_s {
            return;
        }
        self.last_tick_ms = now_ms;
        if dt > self.config.max_dt_s {
            debug!("feed step of {}s skipped, clock resynced", dt);
            return;
        }

        let error = self.torque_target - self.filter.average();
        let adjustment = self.pid.step(error, dt);
        self.feed_rate =
            (self.feed_rate + adjustment * dt).clamp(self.config.min_feed_rate, self.ceiling);

        // The resume ramp owns the velocity until its second step
        if self.resume_step_at.is_some() {
            return;
        }
        let changed = fabs(self.feed_rate - self.issued_rate) >= self.config.significant_change;
        let stale = since(now_ms, self.last_issue_ms) >= self.config.reissue_interval_ms;
        if changed || stale {
            self.issue(drive, self.feed_rate, now_ms);
        }
    }

    fn retract_velocity<D: ServoDriver>(&self, drive: &AxisDrive<D>, scale: f32) -> i32 {
        let magnitude = drive.scaled_velocity(scale) as i32;
        if self.direction > 0.0 {
            -magnitude
        } else {
            magnitude
        }
    }

    fn retract_arrived<D: ServoDriver>(&self, drive: &AxisDrive<D>) -> bool {
        !drive.is_moving() && within(drive.position(), self.retract_to, ARRIVAL_TOLERANCE)
    }

    fn finish(&mut self) {
        self.state = FeedState::Idle;
        self.commanded_sps = 0;
        info!("feed finished");
    }

    fn update_retract<D: ServoDriver>(&mut self, drive: &mut AxisDrive<D>, now_ms: u32) {
        let profile = self.config.retract_profile;
        match self.retract {
            RetractPhase::Settle { until_ms } => {
                if !reached(now_ms, until_ms) || drive.is_moving() {
                    return;
                }
                if !self.retract_enabled {
                    self.finish();
                    return;
                }
                drive.move_to(self.retract_to, profile[0]);
                self.commanded_sps = self.retract_velocity(drive, profile[0]);
                self.retract = RetractPhase::Ramp {
                    step: 1,
                    next_ms: now_ms.wrapping_add(self.config.retract_step_ms),
                };
                debug!("retracting to {}", self.retract_to);
            }
            RetractPhase::Ramp { step, next_ms } => {
                if self.retract_arrived(drive) {
                    self.finish();
                } else if reached(now_ms, next_ms) {
                    drive.set_velocity_scale(profile[step]);
                    self.commanded_sps = self.retract_velocity(drive, profile[step]);
                    self.retract = if step + 1 < profile.len() {
                        RetractPhase::Ramp {
                            step: step + 1,
                            next_ms: next_ms.wrapping_add(self.config.retract_step_ms),
                        }
                    } else {
                        RetractPhase::Return
                    };
                }
            }
            RetractPhase::Return => {
                if self.retract_arrived(drive) {
                    self.finish();
                } else if !drive.is_moving() {
                    // Move ended short of the start, e.g. after a drive hiccup
                    let last = profile[profile.len() - 1];
                    drive.move_to(self.retract_to, last);
                }
            }
        }
    }

    /// Feed hold: decelerate gently and keep the feed resumable
    pub fn pause<D: ServoDriver>(&mut self, drive: &mut AxisDrive<D>) -> Result<(), FeedError> {
        if self.state != FeedState::Feeding {
            return Err(FeedError::NotFeeding);
        }
        drive.set_accel_factor(self.accel_factor * self.config.pause_accel_factor);
        drive.driver_mut().stop_decelerate();
        self.commanded_sps = 0;
        self.ramp_until = None;
        self.resume_step_at = None;
        self.state = FeedState::Paused;
        info!("feed paused at {}", drive.position());
        Ok(())
    }

    /// Continue a paused feed with a two-step velocity ramp
    pub fn resume<D: ServoDriver>(
        &mut self,
        drive: &mut AxisDrive<D>,
        now_ms: u32,
    ) -> Result<(), FeedError> {
        if self.state != FeedState::Paused {
            return Err(FeedError::NotPaused);
        }
        drive.set_accel_factor(self.accel_factor * self.config.ramp_accel_factor);
        self.pid.reset();
        self.filter.clear();
        self.last_tick_ms = now_ms;
        self.state = FeedState::Feeding;

        let first = (self.feed_rate * 0.5).max(self.config.min_feed_rate);
        self.issue(drive, first, now_ms);
        self.resume_step_at = Some(now_ms.wrapping_add(self.config.resume_step_ms));
        self.ramp_until = Some(now_ms.wrapping_add(self.config.ramp_window_ms));
        info!("feed resumed");
        Ok(())
    }

    /// Stop with reduced acceleration and drop to idle
    ///
    /// Normal acceleration comes back `abort_restore_ms` later.
    pub fn abort<D: ServoDriver>(
        &mut self,
        drive: &mut AxisDrive<D>,
        now_ms: u32,
    ) -> Result<(), FeedError> {
        if !self.is_active() {
            return Err(FeedError::NotFeeding);
        }
        drive.set_accel_factor(self.accel_factor * self.config.abort_accel_factor);
        drive.driver_mut().stop_decelerate();
        self.accel_restore_at = Some(now_ms.wrapping_add(self.config.abort_restore_ms));
        self.ramp_until = None;
        self.resume_step_at = None;
        self.commanded_sps = 0;
        self.state = FeedState::Idle;
        warn!("feed aborted at {}", drive.position());
        Ok(())
    }

    /// Forget everything after an emergency stop
    ///
    /// The drive has already been stopped by the caller; acceleration is
    /// restored on the next `update()`.
    pub fn reset(&mut self) {
        self.state = FeedState::Idle;
        self.commanded_sps = 0;
        self.ramp_until = None;
        self.resume_step_at = None;
        self.accel_restore_at = None;
        self.restore_accel_now = true;
        self.pid.reset();
        self.filter.clear();
    }
}
