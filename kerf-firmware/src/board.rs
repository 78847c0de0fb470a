//! Board wiring
//!
//! Concrete driver types for the saw controller board. Pin map:
//!
//! | Signal            | GPIO |
//! |-------------------|------|
//! | X step/dir/enable | 2 / 3 / 4 |
//! | X HLFB            | 5 |
//! | Y step/dir/enable | 6 / 7 / 8 |
//! | Y HLFB            | 9 |
//! | Z step/dir/enable | 10 / 11 / 12 |
//! | Z HLFB            | 13 |
//! | E-stop chain      | 14 (high = safe) |
//! | Safety relay      | 15 |
//! | Spindle contactor | 16 |
//! | Fence encoder A/B | 17 / 18 |
//! | Cycle start       | 19 |
//! | Feed hold         | 20 |
//! | Reset             | 21 |
//!
//! Buttons are active low with internal pull-ups.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_rp::peripherals::PIO0;
use kerf_core::Machine;
use kerf_drivers::servo::torque_from_duty;
use kerf_drivers::{MirroredProgress, RelaySpindle, SharedCount, StepDirServo};
use kerf_hal::gpio::InputPin;
use kerf_hal::step::StepOutput;
use kerf_hal_rp2040::{PioStepper, RpInput, RpOutput};

/// Step output of one axis
///
/// Every axis runs on its own PIO0 state machine, so the stepper types
/// differ by index. The machine needs one servo type for all three axes.
pub enum AxisOutput {
    X(PioStepper<'static, PIO0, 0>),
    Y(PioStepper<'static, PIO0, 1>),
    Z(PioStepper<'static, PIO0, 2>),
}

impl StepOutput for AxisOutput {
    fn set_rate(&mut self, steps_per_s: u32) {
        match self {
            AxisOutput::X(s) => s.set_rate(steps_per_s),
            AxisOutput::Y(s) => s.set_rate(steps_per_s),
            AxisOutput::Z(s) => s.set_rate(steps_per_s),
        }
    }

    fn set_direction(&mut self, forward: bool) {
        match self {
            AxisOutput::X(s) => s.set_direction(forward),
            AxisOutput::Y(s) => s.set_direction(forward),
            AxisOutput::Z(s) => s.set_direction(forward),
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        match self {
            AxisOutput::X(s) => s.set_enabled(enabled),
            AxisOutput::Y(s) => s.set_enabled(enabled),
            AxisOutput::Z(s) => s.set_enabled(enabled),
        }
    }

    fn max_rate(&self) -> u32 {
        match self {
            AxisOutput::X(s) => s.max_rate(),
            AxisOutput::Y(s) => s.max_rate(),
            AxisOutput::Z(s) => s.max_rate(),
        }
    }
}

/// Duty value meaning "no PWM on the line"
const NO_PWM: u32 = u32::MAX;

/// HLFB line state shared between the sampling task and the control loop
///
/// A steady line is a plain asserted/deasserted flag. A PWM line carries
/// the measured torque and reads as deasserted.
pub struct HlfbState {
    asserted: AtomicBool,
    duty_permille: AtomicU32,
}

impl HlfbState {
    pub const fn new() -> Self {
        Self {
            asserted: AtomicBool::new(false),
            duty_permille: AtomicU32::new(NO_PWM),
        }
    }

    pub fn publish_steady(&self, high: bool) {
        self.duty_permille.store(NO_PWM, Ordering::Relaxed);
        self.asserted.store(high, Ordering::Relaxed);
    }

    pub fn publish_duty(&self, permille: u32) {
        self.asserted.store(false, Ordering::Relaxed);
        self.duty_permille.store(permille.min(1000), Ordering::Relaxed);
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted.load(Ordering::Relaxed)
    }

    /// Measured torque, `None` while the drive is not reporting PWM
    pub fn torque_percent(&self) -> Option<f32> {
        match self.duty_permille.load(Ordering::Relaxed) {
            NO_PWM => None,
            permille => Some(torque_from_duty(permille as f32 / 1000.0)),
        }
    }
}

/// HLFB state for X, Y and Z, indexed by `Axis::index`
pub static HLFB: [HlfbState; 3] = [HlfbState::new(), HlfbState::new(), HlfbState::new()];

/// Servo feedback input backed by an [`HlfbState`]
pub struct HlfbLine(pub &'static HlfbState);

impl InputPin for HlfbLine {
    fn is_high(&self) -> bool {
        self.0.is_asserted()
    }
}

pub type Servo = StepDirServo<AxisOutput, HlfbLine>;
pub type Spindle = RelaySpindle<RpOutput<'static>>;

pub type SawMachine = Machine<
    Servo,
    Spindle,
    MirroredProgress,
    RpInput<'static>,
    RpOutput<'static>,
    SharedCount<'static>,
>;
