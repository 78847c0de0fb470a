//! Kerf - Cut-off Saw Controller Firmware
//!
//! Main firmware binary for RP2040-based saw controllers. One control task
//! owns the whole machine and ticks it every millisecond; everything that
//! could stall (flash, edge timing, buttons) runs in its own task and talks
//! to it through channels.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{InterruptHandler as PioInterruptHandler, Pio};
use {defmt_rtt as _, panic_probe as _};

use kerf_core::sequence::MAX_PROGRESS_RECORD_SIZE;
use kerf_core::{Machine, MachineParts};
use kerf_drivers::{
    MirroredProgress, QuadratureEncoder, RelaySpindle, RelaySpindleConfig, SharedCount,
    StepDirServo,
};
use kerf_hal_rp2040::pio::StepLineConfig;
use kerf_hal_rp2040::{PioStepper, Rp2040FlashStorage, RpInput, RpOutput};

use crate::board::{AxisOutput, HlfbLine, HLFB};
use crate::channels::ENCODER_COUNT;
use crate::config::ConfigPersistence;

mod board;
mod channels;
mod commands;
mod config;
mod tasks;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Kerf firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Load configuration and stored progress, then hand flash to the persist task
    let mut persistence = ConfigPersistence::new(Rp2040FlashStorage::new(p.FLASH, p.DMA_CH0));
    let config = persistence.load_or_default().await;

    let mut store = MirroredProgress::new();
    let mut record = [0u8; MAX_PROGRESS_RECORD_SIZE];
    let stored = persistence.load_progress(&mut record).await;
    match store.restore(stored) {
        Ok(0) => info!("No batch in progress"),
        Ok(last) => info!("Resuming after position {}", last),
        Err(e) => warn!("Stored progress discarded: {}", e),
    }
    let flash = persistence.into_storage();

    // Setup PIO0 step generators, one state machine per axis.
    // `common` holds the loaded program and lives as long as main does.
    let Pio {
        mut common,
        sm0,
        sm1,
        sm2,
        ..
    } = Pio::new(p.PIO0, Irqs);

    let line = StepLineConfig::default();
    let x_steps = PioStepper::new(&mut common, sm0, p.PIN_2, p.PIN_3, p.PIN_4, line);
    let y_steps = PioStepper::new(&mut common, sm1, p.PIN_6, p.PIN_7, p.PIN_8, line);
    let z_steps = PioStepper::new(&mut common, sm2, p.PIN_10, p.PIN_11, p.PIN_12, line);

    info!("PIO step generators initialized");

    let mut spindle = RelaySpindle::new(
        RpOutput(Output::new(p.PIN_16, Level::Low)),
        RelaySpindleConfig::contactor(),
    );
    spindle.set_enabled(true);

    let parts = MachineParts {
        x: StepDirServo::new(AxisOutput::X(x_steps), HlfbLine(&HLFB[0])),
        y: StepDirServo::new(AxisOutput::Y(y_steps), HlfbLine(&HLFB[1])),
        z: StepDirServo::new(AxisOutput::Z(z_steps), HlfbLine(&HLFB[2])),
        spindle,
        store,
        safety_input: RpInput(Input::new(p.PIN_14, Pull::None)),
        relay: RpOutput(Output::new(p.PIN_15, Level::Low)),
        encoder: SharedCount(&ENCODER_COUNT),
    };

    let mut machine = Machine::new(parts, config);
    if let Err(e) = machine.setup() {
        warn!("Machine setup incomplete: {}", e);
    }

    let encoder = QuadratureEncoder::new(
        RpInput(Input::new(p.PIN_17, Pull::Up)),
        RpInput(Input::new(p.PIN_18, Pull::Up)),
    );

    let buttons = tasks::PanelButtons {
        start: Input::new(p.PIN_19, Pull::Up),
        hold: Input::new(p.PIN_20, Pull::Up),
        reset: Input::new(p.PIN_21, Pull::Up),
    };

    // Spawn tasks
    spawner.spawn(tasks::tick_task()).unwrap();
    spawner.spawn(tasks::persist_task(flash)).unwrap();
    spawner.spawn(tasks::encoder_task(encoder)).unwrap();
    spawner
        .spawn(tasks::hlfb_task(Input::new(p.PIN_5, Pull::None), &HLFB[0]))
        .unwrap();
    spawner
        .spawn(tasks::hlfb_task(Input::new(p.PIN_9, Pull::None), &HLFB[1]))
        .unwrap();
    spawner
        .spawn(tasks::hlfb_task(Input::new(p.PIN_13, Pull::None), &HLFB[2]))
        .unwrap();
    spawner.spawn(tasks::buttons_task(buttons)).unwrap();
    spawner.spawn(tasks::control_task(machine)).unwrap();

    info!("All tasks spawned, firmware running");

    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}
