//! Trapezoidal velocity profile
//!
//! Integrates a signed velocity at a fixed acceleration limit. Positional
//! moves decelerate once the remaining distance falls inside the stopping
//! distance `v² / 2a`, so no square root is needed on the target.

use kerf_core::motion::fabs;

/// Current profile phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProfileState {
    /// No motion
    Stopped,
    /// Speed magnitude increasing
    Accelerating,
    /// Holding the requested speed
    Cruising,
    /// Speed magnitude decreasing
    Decelerating,
}

/// Software trapezoidal profile in step units
#[derive(Debug, Clone)]
pub struct TrapezoidProfile {
    /// Position in steps, with sub-step resolution
    position: f32,
    /// Signed velocity in steps/s
    velocity: f32,
    /// Speed limit for positional moves (steps/s)
    max_velocity: f32,
    /// Acceleration limit (steps/s²), 0 means unlimited
    accel: f32,
    state: ProfileState,
}

impl Default for TrapezoidProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapezoidProfile {
    pub fn new() -> Self {
        Self {
            position: 0.0,
            velocity: 0.0,
            max_velocity: 0.0,
            accel: 0.0,
            state: ProfileState::Stopped,
        }
    }

    pub fn set_max_velocity(&mut self, steps_per_s: u32) {
        self.max_velocity = steps_per_s as f32;
    }

    pub fn set_acceleration(&mut self, steps_per_s2: u32) {
        self.accel = steps_per_s2 as f32;
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn state(&self) -> ProfileState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ProfileState::Stopped
    }

    /// Redefine the current position without moving
    pub fn set_position(&mut self, steps: f32) {
        self.position = steps;
    }

    /// Distance needed to stop from the current velocity
    pub fn stopping_distance(&self) -> f32 {
        if self.accel <= 0.0 {
            return 0.0;
        }
        self.velocity * self.velocity / (2.0 * self.accel)
    }

    /// Advance a positional move toward `target`
    ///
    /// Returns `true` once the target is reached and the profile is at rest.
    pub fn advance_to(&mut self, target: f32, delta_ms: u32) -> bool {
        let dt = delta_ms as f32 / 1000.0;
        let remaining = target - self.position;
        let dv = self.accel * dt;

        if fabs(remaining) < 0.5 && (self.accel <= 0.0 || fabs(self.velocity) <= dv) {
            self.arrive(target);
            return true;
        }

        let dir = if remaining > 0.0 { 1.0 } else { -1.0 };
        let toward = self.velocity * dir;
        let desired = if toward < 0.0 || self.stopping_distance() >= fabs(remaining) {
            // Heading away, or inside the braking window
            0.0
        } else {
            self.max_velocity * dir
        };
        self.ramp(desired, dt);

        // A profile that braked short still needs to creep in
        if self.velocity == 0.0 && desired == 0.0 && toward >= 0.0 {
            let creep = if self.accel > 0.0 { dv } else { self.max_velocity };
            self.velocity = creep.min(self.max_velocity) * dir;
            self.state = ProfileState::Accelerating;
        }

        let travel = self.velocity * dt;
        if travel * dir >= fabs(remaining) {
            self.arrive(target);
            return true;
        }
        self.position += travel;
        false
    }

    /// Advance toward a signed cruising velocity
    pub fn advance_velocity(&mut self, target_velocity: f32, delta_ms: u32) {
        let dt = delta_ms as f32 / 1000.0;
        self.ramp(target_velocity, dt);
        self.position += self.velocity * dt;
    }

    /// Advance a ramp to rest, returns `true` when stopped
    pub fn advance_stop(&mut self, delta_ms: u32) -> bool {
        self.advance_velocity(0.0, delta_ms);
        self.is_stopped()
    }

    /// Drop velocity to zero immediately
    pub fn halt(&mut self) {
        self.velocity = 0.0;
        self.state = ProfileState::Stopped;
    }

    fn arrive(&mut self, target: f32) {
        self.position = target;
        self.halt();
    }

    fn ramp(&mut self, target: f32, dt: f32) {
        if self.accel <= 0.0 {
            self.velocity = target;
        } else {
            let dv = self.accel * dt;
            if self.velocity < target {
                self.velocity = (self.velocity + dv).min(target);
            } else if self.velocity > target {
                self.velocity = (self.velocity - dv).max(target);
            }
        }

        self.state = if self.velocity == 0.0 && target == 0.0 {
            ProfileState::Stopped
        } else if self.velocity == target {
            ProfileState::Cruising
        } else if fabs(self.velocity) < fabs(target) && self.velocity * target >= 0.0 {
            ProfileState::Accelerating
        } else {
            ProfileState::Decelerating
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(max_velocity: u32, accel: u32) -> TrapezoidProfile {
        let mut p = TrapezoidProfile::new();
        p.set_max_velocity(max_velocity);
        p.set_acceleration(accel);
        p
    }

    #[test]
    fn test_initial_state() {
        let p = TrapezoidProfile::new();
        assert!(p.is_stopped());
        assert_eq!(p.position(), 0.0);
        assert_eq!(p.stopping_distance(), 0.0);
    }

    #[test]
    fn test_velocity_ramp() {
        let mut p = profile(10_000, 1000);
        p.advance_velocity(1000.0, 500);
        assert_eq!(p.velocity(), 500.0);
        assert_eq!(p.state(), ProfileState::Accelerating);

        p.advance_velocity(1000.0, 500);
        assert_eq!(p.velocity(), 1000.0);
        assert_eq!(p.state(), ProfileState::Cruising);

        p.advance_velocity(0.0, 500);
        assert_eq!(p.state(), ProfileState::Decelerating);
        assert!(p.advance_stop(500));
        assert_eq!(p.velocity(), 0.0);
    }

    #[test]
    fn test_positional_move_arrives_exactly() {
        let mut p = profile(4000, 20_000);
        let mut ticks = 0;
        while !p.advance_to(1000.0, 1) {
            ticks += 1;
            assert!(ticks < 2000, "move never finished");
            assert!(p.velocity() <= 4000.0);
        }
        assert_eq!(p.position(), 1000.0);
        assert!(p.is_stopped());
        // 1000 steps at 4000 sps is at least 250 ms
        assert!(ticks >= 250);
    }

    #[test]
    fn test_negative_move() {
        let mut p = profile(2000, 10_000);
        p.set_position(500.0);
        for _ in 0..2000 {
            if p.advance_to(-500.0, 1) {
                break;
            }
        }
        assert_eq!(p.position(), -500.0);
    }

    #[test]
    fn test_reverses_through_zero() {
        let mut p = profile(2000, 10_000);
        p.advance_velocity(2000.0, 200);
        assert!(p.velocity() > 0.0);
        let start = p.position();

        let mut ticks = 0;
        while !p.advance_to(0.0, 1) {
            ticks += 1;
            assert!(ticks < 5000);
        }
        // Overshoot while braking, then came back
        assert!(start > 0.0);
        assert_eq!(p.position(), 0.0);
    }

    #[test]
    fn test_unlimited_acceleration() {
        let mut p = profile(1000, 0);
        p.advance_velocity(500.0, 10);
        assert_eq!(p.velocity(), 500.0);
        assert!(p.advance_to(p.position() + 5.0, 10));
    }

    #[test]
    fn test_halt() {
        let mut p = profile(1000, 1000);
        p.advance_velocity(1000.0, 100);
        p.halt();
        assert!(p.is_stopped());
        assert_eq!(p.velocity(), 0.0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_moves_arrive_within_speed_limit(
                start in -20_000.0f32..20_000.0,
                target in -20_000i32..20_000,
                max_velocity in 500u32..40_000,
                accel in 5_000u32..200_000,
            ) {
                let mut p = profile(max_velocity, accel);
                p.set_position(start);
                let target = target as f32;

                let distance = fabs(target - start);
                let budget_ms = (distance / max_velocity as f32 * 1000.0) as u32
                    + 2 * max_velocity * 1000 / accel
                    + 1_000;

                let mut elapsed = 0u32;
                while !p.advance_to(target, 1) {
                    elapsed += 1;
                    prop_assert!(fabs(p.velocity()) <= max_velocity as f32);
                    prop_assert!(elapsed <= budget_ms);
                }
                prop_assert_eq!(p.position(), target);
                prop_assert!(p.is_stopped());
            }
        }
    }
}
