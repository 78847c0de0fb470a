//! Quadrature encoder decoding
//!
//! Polled x4 decoding of an A/B channel pair. Every edge on either channel
//! counts one. A poll that sees both channels change at once has missed an
//! edge; it is counted as an error and leaves the position untouched.
//!
//! The decoder is meant to be polled from a fast task. The control loop
//! reads the count through [`SharedCount`], which only needs atomic loads
//! and stores (no compare-and-swap on Cortex-M0).

use core::sync::atomic::{AtomicI32, Ordering};

use kerf_core::traits::EncoderInput;
use kerf_hal::gpio::InputPin;

/// Count change indexed by `previous << 2 | current` (state = A << 1 | B)
const TRANSITIONS: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

/// Polled quadrature decoder
pub struct QuadratureEncoder<A, B> {
    a: A,
    b: B,
    state: u8,
    count: i32,
    /// Polls that saw both channels change
    errors: u32,
    reversed: bool,
}

impl<A: InputPin, B: InputPin> QuadratureEncoder<A, B> {
    pub fn new(a: A, b: B) -> Self {
        let mut encoder = Self {
            a,
            b,
            state: 0,
            count: 0,
            errors: 0,
            reversed: false,
        };
        encoder.state = encoder.read_state();
        encoder
    }

    /// Swap the counting direction
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    /// Sample the channels and return the updated count
    pub fn poll(&mut self) -> i32 {
        let current = self.read_state();
        if current != self.state {
            let index = ((self.state << 2) | current) as usize;
            match TRANSITIONS[index] {
                0 => self.errors = self.errors.wrapping_add(1),
                delta => {
                    let delta = if self.reversed { -delta } else { delta };
                    self.count = self.count.wrapping_add(delta as i32);
                }
            }
            self.state = current;
        }
        self.count
    }

    /// Poll and publish the count for other tasks
    pub fn poll_into(&mut self, shared: &AtomicI32) {
        let count = self.poll();
        shared.store(count, Ordering::Relaxed);
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    fn read_state(&self) -> u8 {
        ((self.a.is_high() as u8) << 1) | self.b.is_high() as u8
    }
}

impl<A: InputPin, B: InputPin> EncoderInput for QuadratureEncoder<A, B> {
    fn count(&self) -> i32 {
        self.count
    }
}

/// Read side of a count published by a polling task
#[derive(Clone, Copy)]
pub struct SharedCount<'a>(pub &'a AtomicI32);

impl EncoderInput for SharedCount<'_> {
    fn count(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }
}
