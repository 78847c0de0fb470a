//! PIO step pulse generator
//!
//! Uses RP2040's Programmable I/O to generate step pulses for one servo
//! axis. Direction and enable are plain GPIO outputs.

use embassy_rp::gpio::{Level, Output, Pin};
use embassy_rp::pio::{Common, Config, Direction as PioDirection, Instance, PioPin, StateMachine};
use embassy_rp::Peri;
use fixed::types::U24F8;
use kerf_hal::step::StepOutput;

use crate::pio::{divider_bits, StepLineConfig, MAX_STEP_FREQ_HZ, MIN_STEP_FREQ_HZ};

/// PIO step/direction output
pub struct PioStepper<'d, PIO: Instance, const SM: usize> {
    sm: StateMachine<'d, PIO, SM>,
    dir_pin: Output<'d>,
    enable_pin: Output<'d>,
    config: StepLineConfig,
    current_freq_hz: u32,
    running: bool,
}

impl<'d, PIO: Instance, const SM: usize> PioStepper<'d, PIO, SM> {
    /// Load the step program into `sm` and claim the axis pins
    ///
    /// The drive starts disabled with the pulse train stopped.
    pub fn new<STEP: PioPin, DIR: Pin, EN: Pin>(
        common: &mut Common<'d, PIO>,
        mut sm: StateMachine<'d, PIO, SM>,
        step_pin: Peri<'d, STEP>,
        dir_pin: Peri<'d, DIR>,
        enable_pin: Peri<'d, EN>,
        config: StepLineConfig,
    ) -> Self {
        // 32 cycles high, 32 cycles low
        let prg = pio::pio_asm!(
            ".wrap_target",
            "set pins, 1 [31]",
            "set pins, 0 [31]",
            ".wrap"
        );

        let installed = common.load_program(&prg.program);
        let step_pio_pin = common.make_pio_pin(step_pin);

        let mut cfg = Config::default();
        cfg.use_program(&installed, &[&step_pio_pin]);
        cfg.set_set_pins(&[&step_pio_pin]);
        cfg.clock_divider = U24F8::from_bits(divider_bits(0));

        sm.set_config(&cfg);
        sm.set_pin_dirs(PioDirection::Out, &[&step_pio_pin]);

        let dir_pin = Output::new(dir_pin, Self::level(!config.dir_inverted));
        let enable_pin = Output::new(enable_pin, Self::level(config.enable_inverted));

        Self {
            sm,
            dir_pin,
            enable_pin,
            config,
            current_freq_hz: 0,
            running: false,
        }
    }

    fn level(high: bool) -> Level {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Current pulse rate in Hz
    pub fn current_freq(&self) -> u32 {
        self.current_freq_hz
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stop pulse generation
    pub fn stop(&mut self) {
        self.sm.set_enable(false);
        self.running = false;
        self.current_freq_hz = 0;
    }
}

impl<'d, PIO: Instance, const SM: usize> StepOutput for PioStepper<'d, PIO, SM> {
    fn set_rate(&mut self, steps_per_s: u32) {
        let freq = steps_per_s.min(MAX_STEP_FREQ_HZ);
        if freq < MIN_STEP_FREQ_HZ {
            self.stop();
            return;
        }
        self.current_freq_hz = freq;
        self.sm.set_clock_divider(U24F8::from_bits(divider_bits(freq)));

        if !self.running {
            self.sm.set_enable(true);
            self.running = true;
        }
    }

    fn set_direction(&mut self, forward: bool) {
        self.dir_pin.set_level(Self::level(forward != self.config.dir_inverted));
    }

    fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.stop();
        }
        self.enable_pin
            .set_level(Self::level(enabled != self.config.enable_inverted));
    }

    fn max_rate(&self) -> u32 {
        MAX_STEP_FREQ_HZ
    }
}
