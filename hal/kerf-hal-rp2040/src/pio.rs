//! PIO step pulse timing
//!
//! Each servo axis gets its own PIO state machine running the same
//! two-instruction square wave program. The step rate is set entirely by
//! the state machine clock divider, so retuning a rate mid-move is a single
//! register write and never glitches the pulse train.
//!
//! Both instructions carry a 31 cycle delay, so one step period is 64 PIO
//! cycles. That keeps the 16.8 divider usable down to about 30 Hz while the
//! 200 kHz ceiling still leaves a 2.5µs high time.

/// System clock frequency (RP2040 default)
pub const SYS_CLK_HZ: u32 = 125_000_000;

/// Minimum pulse width in nanoseconds
pub const MIN_PULSE_WIDTH_NS: u32 = 2500;

/// Maximum step frequency in Hz (limited by pulse width)
pub const MAX_STEP_FREQ_HZ: u32 = 200_000;

/// Lowest rate the divider can reach; slower requests stop the pulses
pub const MIN_STEP_FREQ_HZ: u32 = 30;

/// PIO cycles per step period (two instructions, 32 cycles each)
pub const CYCLES_PER_STEP: u32 = 64;

/// Line polarity for one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepLineConfig {
    /// Enable line is active low
    pub enable_inverted: bool,
    /// Direction line is low for forward motion
    pub dir_inverted: bool,
}

impl Default for StepLineConfig {
    fn default() -> Self {
        Self {
            // ClearPath enable input through an open-collector stage
            enable_inverted: true,
            dir_inverted: false,
        }
    }
}

/// Calculate the clock divider for a target frequency
///
/// The PIO program runs at SYS_CLK / divider Hz and spends
/// [`CYCLES_PER_STEP`] cycles per step.
///
/// Returns (integer_part, fractional_part) for the 16.8 fixed-point divider.
pub fn calc_clock_divider(freq_hz: u32) -> (u16, u8) {
    if freq_hz == 0 {
        return (0xFFFF, 0xFF); // Maximum divider = stopped
    }

    let divisor = freq_hz as u64 * CYCLES_PER_STEP as u64;
    let divider_x256 = (SYS_CLK_HZ as u64 * 256) / divisor;

    let int_part = (divider_x256 / 256).clamp(1, 0xFFFF) as u16;
    let frac_part = if divider_x256 / 256 > 0xFFFF {
        0xFF
    } else {
        (divider_x256 % 256) as u8
    };

    (int_part, frac_part)
}

/// Step rate actually produced by a divider
pub fn freq_for_divider(int_part: u16, frac_part: u8) -> u32 {
    let divider_x256 = ((int_part as u64) << 8) | frac_part as u64;
    if divider_x256 == 0 {
        return 0;
    }
    ((SYS_CLK_HZ as u64 * 256) / (divider_x256 * CYCLES_PER_STEP as u64)) as u32
}

/// Divider packed as the PIO `CLKDIV` 16.8 bit pattern
pub fn divider_bits(freq_hz: u32) -> u32 {
    let (int_part, frac_part) = calc_clock_divider(freq_hz);
    ((int_part as u32) << 8) | frac_part as u32
}
