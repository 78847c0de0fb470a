//! HLFB sampling task
//!
//! Tracks one servo's high-level feedback line. A line without edges for
//! [`STEADY_TIMEOUT`] is steady and reported as a level. A toggling line
//! is the drive's torque PWM; its duty cycle is timed edge to edge.

use embassy_rp::gpio::Input;
use embassy_time::{with_timeout, Duration, Instant};

use crate::board::HlfbState;

/// The drive's PWM runs near 482 Hz, so 5 ms without an edge is steady
const STEADY_TIMEOUT: Duration = Duration::from_millis(5);

#[embassy_executor::task(pool_size = 3)]
pub async fn hlfb_task(mut pin: Input<'static>, state: &'static HlfbState) {
    loop {
        if with_timeout(STEADY_TIMEOUT, pin.wait_for_rising_edge())
            .await
            .is_err()
        {
            state.publish_steady(pin.is_high());
            continue;
        }
        let rise = Instant::now();

        if with_timeout(STEADY_TIMEOUT, pin.wait_for_falling_edge())
            .await
            .is_err()
        {
            state.publish_steady(true);
            continue;
        }
        let fall = Instant::now();

        if with_timeout(STEADY_TIMEOUT, pin.wait_for_rising_edge())
            .await
            .is_err()
        {
            state.publish_steady(false);
            continue;
        }

        let period_us = rise.elapsed().as_micros();
        let high_us = fall.duration_since(rise).as_micros();
        if period_us > 0 {
            state.publish_duty((high_us * 1000 / period_us) as u32);
        }
    }
}
