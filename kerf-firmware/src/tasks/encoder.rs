//! Fence encoder task
//!
//! Polls the quadrature channels fast enough to see every edge at full
//! fence speed and publishes the count for the control loop.

use defmt::*;
use embassy_time::{Duration, Ticker};

use kerf_drivers::QuadratureEncoder;
use kerf_hal_rp2040::RpInput;

use crate::channels::ENCODER_COUNT;

/// Poll period in microseconds (20 kHz)
const POLL_INTERVAL_US: u64 = 50;

/// Polls between error checks (about one second)
const ERROR_CHECK_POLLS: u32 = 20_000;

#[embassy_executor::task]
pub async fn encoder_task(mut encoder: QuadratureEncoder<RpInput<'static>, RpInput<'static>>) {
    info!("Encoder task started");

    let mut ticker = Ticker::every(Duration::from_micros(POLL_INTERVAL_US));
    let mut polls = 0u32;
    let mut reported_errors = 0u32;

    loop {
        ticker.next().await;
        encoder.poll_into(&ENCODER_COUNT);

        polls += 1;
        if polls >= ERROR_CHECK_POLLS {
            polls = 0;
            let errors = encoder.errors();
            if errors != reported_errors {
                warn!(
                    "Encoder missed {} edges",
                    errors.wrapping_sub(reported_errors)
                );
                reported_errors = errors;
            }
        }
    }
}
