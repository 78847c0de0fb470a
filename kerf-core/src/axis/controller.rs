//! Axis controller
//!
//! Owns one servo and gates every motion command on setup, homing, feed
//! activity, the safety motion permit and the soft travel limits.

use crate::clock::reached;
use crate::config::{AxisConfig, FeedConfig};
use crate::feed::{FeedError, FeedState, TorqueFeedController};
use crate::motion::{within, Axis};
use crate::traits::{ServoAlerts, ServoDriver};

use super::drive::AxisDrive;
use super::homing::{HomingFailure, HomingOutcome, HomingSequencer, HomingState};

/// Disable time before a faulted drive is re-enabled during alert clearing
pub const ALERT_SETTLE_MS: u32 = 100;

/// Axis command errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisError {
    /// `setup()` has not completed
    NotSetup,
    /// Drive did not report enabled after setup
    EnableFailed,
    /// Safety chain is open
    Interlocked,
    /// Homing in progress
    Homing,
    /// Torque feed in progress
    FeedActive,
    /// Target outside `[0, max_travel]`
    OutOfTravel,
    /// Feed controller rejected the request
    Feed(FeedError),
}

impl From<FeedError> for AxisError {
    fn from(err: FeedError) -> Self {
        AxisError::Feed(err)
    }
}

/// Axis status snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisStatus {
    pub position: f32,
    pub moving: bool,
    pub homed: bool,
    pub homing: HomingState,
    pub feed: FeedState,
    pub alerts: ServoAlerts,
    pub clearing_alerts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlertRecovery {
    None,
    /// Drive disabled, waiting to re-enable and clear
    SettleWait { until_ms: u32 },
}

pub struct AxisController<D> {
    axis: Axis,
    drive: AxisDrive<D>,
    homing: HomingSequencer,
    feed: TorqueFeedController,
    setup_done: bool,
    homed: bool,
    home_count: u32,
    last_homing_failure: Option<HomingFailure>,
    moving: bool,
    position: f32,
    motion_permit: bool,
    recovery: AlertRecovery,
}

impl<D: ServoDriver> AxisController<D> {
    pub fn new(axis: Axis, driver: D, config: &AxisConfig, feed: &FeedConfig) -> Self {
        Self {
            axis,
            drive: AxisDrive::new(driver, config),
            homing: HomingSequencer::new(config.homing),
            feed: TorqueFeedController::new(feed),
            setup_done: false,
            homed: false,
            home_count: 0,
            last_homing_failure: None,
            moving: false,
            position: 0.0,
            motion_permit: true,
            recovery: AlertRecovery::None,
        }
    }

    /// Enable the drive and load its limits; idempotent
    pub fn setup(&mut self) -> Result<(), AxisError> {
        if self.setup_done {
            return Ok(());
        }
        self.drive.driver_mut().enable(true);
        if !self.drive.driver().is_enabled() {
            error!("axis {} failed to enable", self.axis);
            return Err(AxisError::EnableFailed);
        }
        self.drive.apply_limits();
        self.position = self.drive.position();
        self.setup_done = true;
        info!("axis {} ready", self.axis);
        Ok(())
    }

    /// Refresh position and advance homing, feed and alert recovery
    pub fn update(&mut self, now_ms: u32) {
        if !self.setup_done {
            return;
        }
        self.refresh();

        if let AlertRecovery::SettleWait { until_ms } = self.recovery {
            if reached(now_ms, until_ms) {
                let driver = self.drive.driver_mut();
                driver.enable(true);
                driver.clear_alerts();
                self.drive.apply_limits();
                self.recovery = AlertRecovery::None;
                info!("axis {} re-enabled after alert clear", self.axis);
            }
        }

        match self.homing.process(&mut self.drive, now_ms) {
            HomingOutcome::Homed => {
                self.homed = true;
                self.home_count += 1;
                self.last_homing_failure = None;
                self.drive.apply_limits();
                info!("axis {} homed ({})", self.axis, self.home_count);
            }
            HomingOutcome::Failed(failure) => {
                self.last_homing_failure = Some(failure);
            }
            HomingOutcome::Idle | HomingOutcome::Busy => {}
        }

        self.feed.update(&mut self.drive, now_ms);
        self.refresh();
    }

    fn refresh(&mut self) {
        self.position = self.drive.position();
        self.moving = self.drive.is_moving();
    }

    fn check_ready(&self) -> Result<(), AxisError> {
        if !self.setup_done {
            return Err(AxisError::NotSetup);
        }
        if !self.motion_permit {
            return Err(AxisError::Interlocked);
        }
        if self.homing.is_active() {
            return Err(AxisError::Homing);
        }
        Ok(())
    }

    /// Start the homing sequence
    pub fn start_homing(&mut self, now_ms: u32) -> Result<(), AxisError> {
        self.check_ready()?;
        if self.feed.is_active() {
            return Err(AxisError::FeedActive);
        }
        self.homed = false;
        self.homing.start(&mut self.drive, now_ms);
        self.moving = true;
        info!("axis {} homing", self.axis);
        Ok(())
    }

    /// Move to an absolute position at `scale` of max velocity
    ///
    /// A target outside the travel window also halts the axis.
    pub fn move_to(&mut self, position: f32, scale: f32) -> Result<(), AxisError> {
        self.check_ready()?;
        if self.feed.is_active() {
            return Err(AxisError::FeedActive);
        }
        if !self.drive.limits().in_travel(position) {
            self.drive.driver_mut().stop_abrupt();
            self.refresh();
            warn!("axis {} target {} outside travel", self.axis, position);
            return Err(AxisError::OutOfTravel);
        }
        self.drive.move_to(position, scale);
        self.refresh();
        debug!("axis {} move to {}", self.axis, position);
        Ok(())
    }

    /// Command a move once, then report arrival
    ///
    /// `issued` tracks whether the move went out; an axis that comes to
    /// rest outside `tolerance` gets the move again.
    pub fn approach(
        &mut self,
        target: f32,
        scale: f32,
        tolerance: f32,
        issued: &mut bool,
    ) -> Result<bool, AxisError> {
        if !*issued {
            self.move_to(target, scale)?;
            *issued = true;
            return Ok(false);
        }
        if self.moving {
            return Ok(false);
        }
        if within(self.position, target, tolerance) {
            return Ok(true);
        }
        warn!(
            "axis {} stopped at {} short of {}, reissuing",
            self.axis,
            self.position,
            target
        );
        self.move_to(target, scale)?;
        Ok(false)
    }

    /// Move by `delta` from the commanded position
    pub fn jog(&mut self, delta: f32, scale: f32) -> Result<(), AxisError> {
        let target = self.drive.position() + delta;
        self.move_to(target, scale)
    }

    /// Decelerate to a stop, cancelling homing or feed
    pub fn stop(&mut self) {
        self.homing.abort();
        if self.feed.is_active() {
            self.feed.reset();
        }
        self.drive.driver_mut().stop_decelerate();
        self.refresh();
    }

    /// Stop immediately and drop homing and feed to idle
    pub fn emergency_stop(&mut self) {
        self.drive.driver_mut().stop_abrupt();
        self.homing.abort();
        self.feed.reset();
        self.refresh();
        warn!("axis {} emergency stop", self.axis);
    }

    /// Clear drive alerts
    ///
    /// A motor fault needs an enable cycle: the drive is disabled now and
    /// re-enabled `ALERT_SETTLE_MS` later from `update()`.
    pub fn clear_alerts(&mut self, now_ms: u32) -> Result<(), AxisError> {
        if !self.setup_done {
            return Err(AxisError::NotSetup);
        }
        let alerts = self.drive.driver().alerts();
        if alerts.needs_enable_cycle() {
            self.homing.abort();
            self.feed.reset();
            self.drive.driver_mut().enable(false);
            self.recovery = AlertRecovery::SettleWait {
                until_ms: now_ms.wrapping_add(ALERT_SETTLE_MS),
            };
            warn!("axis {} fault, cycling enable", self.axis);
        } else {
            self.drive.driver_mut().clear_alerts();
        }
        Ok(())
    }

    pub fn is_clearing_alerts(&self) -> bool {
        self.recovery != AlertRecovery::None
    }

    pub fn has_alerts(&self) -> bool {
        self.drive.driver().alerts().any()
    }

    pub fn alerts(&self) -> ServoAlerts {
        self.drive.driver().alerts()
    }

    /// Retune the velocity limit, including a move in flight
    pub fn set_velocity_scale(&mut self, scale: f32) {
        self.drive.set_velocity_scale(scale);
    }

    /// Gate for new motion commands, driven by the safety interlock
    pub fn set_motion_permit(&mut self, permitted: bool) {
        self.motion_permit = permitted;
    }

    pub fn motion_permitted(&self) -> bool {
        self.motion_permit
    }

    /// Start a torque feed that retracts afterwards if configured
    pub fn start_torque_feed(&mut self, target: f32, scale: f32, now_ms: u32) -> Result<(), AxisError> {
        self.check_ready()?;
        self.feed.start(&mut self.drive, target, scale, now_ms)?;
        self.refresh();
        Ok(())
    }

    /// Start a torque feed that stops at the target
    pub fn start_feed_to_stop(&mut self, target: f32, scale: f32, now_ms: u32) -> Result<(), AxisError> {
        self.check_ready()?;
        self.feed.start_to_stop(&mut self.drive, target, scale, now_ms)?;
        self.refresh();
        Ok(())
    }

    pub fn pause_feed(&mut self) -> Result<(), AxisError> {
        self.feed.pause(&mut self.drive)?;
        self.refresh();
        Ok(())
    }

    pub fn resume_feed(&mut self, now_ms: u32) -> Result<(), AxisError> {
        if !self.motion_permit {
            return Err(AxisError::Interlocked);
        }
        self.feed.resume(&mut self.drive, now_ms)?;
        self.refresh();
        Ok(())
    }

    pub fn abort_feed(&mut self, now_ms: u32) -> Result<(), AxisError> {
        self.feed.abort(&mut self.drive, now_ms)?;
        self.refresh();
        Ok(())
    }

    /// Set the feed torque target, returns the clamped value
    pub fn set_torque_target(&mut self, percent: f32) -> f32 {
        self.feed.set_torque_target(percent)
    }

    /// Set the acceleration factor, applied now unless a ramp owns it
    pub fn set_accel_factor(&mut self, factor: f32) -> f32 {
        let factor = self.feed.set_accel_factor(factor);
        if !self.feed.in_reduced_accel() {
            self.drive.set_accel_factor(factor);
        }
        factor
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn is_setup(&self) -> bool {
        self.setup_done
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    pub fn is_homing(&self) -> bool {
        self.homing.is_active()
    }

    /// Number of successful homing runs since power-up
    pub fn home_count(&self) -> u32 {
        self.home_count
    }

    pub fn homing_state(&self) -> HomingState {
        self.homing.state()
    }

    pub fn last_homing_failure(&self) -> Option<HomingFailure> {
        self.last_homing_failure
    }

    pub fn torque_percent(&self) -> f32 {
        self.drive.torque_percent()
    }

    pub fn feed(&self) -> &TorqueFeedController {
        &self.feed
    }

    pub fn drive(&self) -> &AxisDrive<D> {
        &self.drive
    }

    pub fn driver(&self) -> &D {
        self.drive.driver()
    }

    pub fn driver_mut(&mut self) -> &mut D {
        self.drive.driver_mut()
    }

    pub fn status(&self) -> AxisStatus {
        AxisStatus {
            position: self.position,
            moving: self.moving,
            homed: self.homed,
            homing: self.homing.state(),
            feed: self.feed.state(),
            alerts: self.alerts(),
            clearing_alerts: self.is_clearing_alerts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::ARRIVAL_TOLERANCE;
    use crate::testing::{run_axis_until, step_axis, SimServo};

    fn axis_with(servo: SimServo) -> AxisController<SimServo> {
        let mut axis = AxisController::new(
            Axis::X,
            servo,
            &AxisConfig::fence(),
            &FeedConfig::default(),
        );
        axis.setup().unwrap();
        axis
    }

    fn axis() -> AxisController<SimServo> {
        axis_with(SimServo::new())
    }

    #[test]
    fn test_commands_rejected_before_setup() {
        let mut axis = AxisController::new(
            Axis::Y,
            SimServo::new(),
            &AxisConfig::table(),
            &FeedConfig::default(),
        );
        assert_eq!(axis.move_to(1.0, 1.0), Err(AxisError::NotSetup));
        assert_eq!(axis.start_homing(0), Err(AxisError::NotSetup));
        assert_eq!(axis.clear_alerts(0), Err(AxisError::NotSetup));
    }

    #[test]
    fn test_setup_is_idempotent() {
        let mut axis = axis();
        assert!(axis.is_setup());
        assert!(axis.setup().is_ok());
        assert_eq!(axis.driver().max_velocity, 40_000);
    }

    #[test]
    fn test_setup_fails_when_drive_refuses_enable() {
        let mut servo = SimServo::new();
        servo.refuse_enable = true;
        let mut axis = AxisController::new(Axis::X, servo, &AxisConfig::fence(), &FeedConfig::default());
        assert_eq!(axis.setup(), Err(AxisError::EnableFailed));
        assert!(!axis.is_setup());
    }

    #[test]
    fn test_move_within_travel_arrives() {
        let mut axis = axis();
        let mut now = 0;
        axis.move_to(12.5, 1.0).unwrap();
        assert!(axis.is_moving());
        assert!(run_axis_until(&mut axis, &mut now, 5_000, |a| !a.is_moving()));
        assert!(within(axis.position(), 12.5, ARRIVAL_TOLERANCE));
    }

    #[test]
    fn test_move_outside_travel_rejected_and_halts() {
        let mut axis = axis();
        let mut now = 0;
        axis.move_to(10.0, 1.0).unwrap();
        step_axis(&mut axis, &mut now, 10);
        assert!(axis.is_moving());

        assert_eq!(axis.move_to(48.5, 1.0), Err(AxisError::OutOfTravel));
        assert_eq!(axis.move_to(-0.1, 1.0), Err(AxisError::OutOfTravel));
        assert!(!axis.is_moving());
        assert_eq!(axis.driver().abrupt_stops, 2);
    }

    #[test]
    fn test_jog_is_relative() {
        let mut axis = axis();
        let mut now = 0;
        axis.move_to(5.0, 1.0).unwrap();
        run_axis_until(&mut axis, &mut now, 5_000, |a| !a.is_moving());
        axis.jog(-1.25, 0.5).unwrap();
        run_axis_until(&mut axis, &mut now, 5_000, |a| !a.is_moving());
        assert!(within(axis.position(), 3.75, ARRIVAL_TOLERANCE));
        assert_eq!(axis.jog(-10.0, 0.5), Err(AxisError::OutOfTravel));
    }

    #[test]
    fn test_motion_permit_blocks_commands() {
        let mut axis = axis();
        axis.set_motion_permit(false);
        assert_eq!(axis.move_to(1.0, 1.0), Err(AxisError::Interlocked));
        assert_eq!(axis.start_homing(0), Err(AxisError::Interlocked));
        assert_eq!(axis.start_torque_feed(5.0, 0.5, 0), Err(AxisError::Interlocked));
        axis.set_motion_permit(true);
        assert!(axis.move_to(1.0, 1.0).is_ok());
    }

    #[test]
    fn test_homing_marks_homed_and_blocks_moves() {
        let mut axis = axis_with(SimServo::with_hard_stop(-8_000));
        let mut now = 0;
        axis.start_homing(now).unwrap();
        assert!(!axis.is_homed());
        assert_eq!(axis.move_to(1.0, 1.0), Err(AxisError::Homing));
        assert_eq!(axis.start_homing(now), Err(AxisError::Homing));

        assert!(run_axis_until(&mut axis, &mut now, 10_000, |a| a.is_homed()));
        assert_eq!(axis.home_count(), 1);
        assert_eq!(axis.position(), 0.0);
        assert_eq!(axis.homing_state(), HomingState::Idle);
        assert!(axis.move_to(1.0, 1.0).is_ok());
    }

    #[test]
    fn test_homing_failure_is_recorded() {
        let mut axis = axis();
        let mut now = 0;
        axis.start_homing(now).unwrap();
        run_axis_until(&mut axis, &mut now, 40_000, |a| !a.is_homing());
        assert_eq!(axis.homing_state(), HomingState::Failed);
        assert_eq!(axis.last_homing_failure(), Some(HomingFailure::Timeout));
        assert!(!axis.is_homed());
    }

    #[test]
    fn test_feed_blocks_moves() {
        let mut axis = axis();
        axis.start_torque_feed(5.0, 0.5, 0).unwrap();
        assert!(axis.feed().is_active());
        assert_eq!(axis.move_to(1.0, 1.0), Err(AxisError::FeedActive));
        assert_eq!(axis.start_homing(0), Err(AxisError::FeedActive));
        assert_eq!(
            axis.start_torque_feed(6.0, 0.5, 0),
            Err(AxisError::Feed(FeedError::Busy))
        );
    }

    #[test]
    fn test_emergency_stop_resets_feed_and_homing() {
        let mut axis = axis();
        let mut now = 0;
        axis.start_torque_feed(20.0, 0.5, now).unwrap();
        for _ in 0..20 {
            step_axis(&mut axis, &mut now, 10);
        }
        axis.emergency_stop();
        assert_eq!(axis.feed().state(), FeedState::Idle);
        assert_eq!(axis.feed().commanded_velocity(), 0);
        assert!(!axis.is_moving());

        axis.start_homing(now).unwrap();
        axis.emergency_stop();
        assert_eq!(axis.homing_state(), HomingState::Idle);
        assert!(!axis.is_homed());
    }

    #[test]
    fn test_clear_alerts_cycles_enable_for_fault() {
        let mut axis = axis();
        let mut now = 0;
        axis.driver_mut().alerts = ServoAlerts {
            motor_faulted: true,
            ..ServoAlerts::NONE
        };
        assert!(axis.has_alerts());
        axis.clear_alerts(now).unwrap();
        assert!(axis.is_clearing_alerts());
        assert!(!axis.driver().is_enabled());

        step_axis(&mut axis, &mut now, 50);
        assert!(axis.is_clearing_alerts());
        step_axis(&mut axis, &mut now, 50);
        assert!(!axis.is_clearing_alerts());
        assert!(axis.driver().is_enabled());
        assert!(!axis.has_alerts());
    }

    #[test]
    fn test_clear_alerts_without_fault_is_immediate() {
        let mut axis = axis();
        axis.driver_mut().alerts = ServoAlerts {
            move_canceled: true,
            ..ServoAlerts::NONE
        };
        axis.clear_alerts(0).unwrap();
        assert!(!axis.is_clearing_alerts());
        assert!(!axis.has_alerts());
    }

    #[test]
    fn test_velocity_scale_retunes_move_in_flight() {
        let mut axis = axis();
        axis.move_to(20.0, 1.0).unwrap();
        axis.set_velocity_scale(0.25);
        assert_eq!(axis.driver().max_velocity, 10_000);
    }

    #[test]
    fn test_accel_factor_applies_when_idle() {
        let mut axis = axis();
        assert_eq!(axis.set_accel_factor(0.5), 0.5);
        assert_eq!(axis.driver().max_accel, 80_000);
        assert_eq!(axis.set_accel_factor(10.0), 2.0);
        assert_eq!(axis.driver().max_accel, 320_000);
    }

    #[test]
    fn test_approach_reports_arrival_and_reissues() {
        let mut axis = axis();
        let mut now = 0;
        let mut issued = false;
        assert_eq!(axis.approach(2.0, 1.0, ARRIVAL_TOLERANCE, &mut issued), Ok(false));
        assert!(issued);
        // Interrupt the move halfway
        step_axis(&mut axis, &mut now, 100);
        axis.stop();
        assert_eq!(axis.approach(2.0, 1.0, ARRIVAL_TOLERANCE, &mut issued), Ok(false));
        assert!(axis.is_moving());
        run_axis_until(&mut axis, &mut now, 5_000, |a| !a.is_moving());
        assert_eq!(axis.approach(2.0, 1.0, ARRIVAL_TOLERANCE, &mut issued), Ok(true));
    }
}
