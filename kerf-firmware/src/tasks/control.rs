//! Control task
//!
//! Owns the machine and runs it once per tick:
//!
//! 1. Feed HLFB torque readings into the servos and advance their profiles
//! 2. `Machine::tick`
//! 3. Hand dirty progress to the persist task, one write in flight at a time
//! 4. Publish the status snapshot
//!
//! Operator commands are applied between ticks.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_sync::channel::TrySendError;

use kerf_core::clock::since;
use kerf_core::motion::Axis;

use crate::board::{SawMachine, HLFB};
use crate::channels::{COMMAND_CHANNEL, PROGRESS_COMMITS, PROGRESS_WRITES, STATUS};
use crate::commands;
use crate::tasks::tick::TICK_SIGNAL;

/// Status snapshot period
const STATUS_INTERVAL_MS: u32 = 50;

/// Longest gap fed to the servo profiles after a stall
const MAX_STEP_MS: u32 = 10;

struct ControlLoop {
    machine: SawMachine,
    last_tick_ms: u32,
    last_status_ms: u32,
    /// A progress write is with the persist task
    write_in_flight: bool,
}

impl ControlLoop {
    fn new(machine: SawMachine, now_ms: u32) -> Self {
        Self {
            machine,
            last_tick_ms: now_ms,
            last_status_ms: now_ms,
            write_in_flight: false,
        }
    }

    fn tick(&mut self, now_ms: u32) {
        let delta_ms = since(now_ms, self.last_tick_ms);
        self.last_tick_ms = now_ms;
        if delta_ms > MAX_STEP_MS {
            trace!("Control loop late by {} ms", delta_ms);
        }
        let delta_ms = delta_ms.min(MAX_STEP_MS);

        for axis in Axis::ALL {
            let servo = self.machine.driver_mut(axis);
            servo.set_measured_torque(HLFB[axis.index()].torque_percent());
            servo.update(delta_ms);
        }

        self.machine.tick(now_ms);
        self.flush_progress();

        if since(now_ms, self.last_status_ms) >= STATUS_INTERVAL_MS {
            self.last_status_ms = now_ms;
            STATUS.signal(self.machine.status());
        }
    }

    fn flush_progress(&mut self) {
        let store = self.machine.store_mut();

        while let Ok(result) = PROGRESS_COMMITS.try_receive() {
            self.write_in_flight = false;
            match result {
                Ok(()) => store.mark_committed(),
                Err(write) => {
                    warn!("Progress commit failed, retrying");
                    store.mark_failed(write);
                }
            }
        }

        if self.write_in_flight {
            return;
        }
        if let Some(write) = store.take_pending() {
            match PROGRESS_WRITES.try_send(write) {
                Ok(()) => self.write_in_flight = true,
                Err(TrySendError::Full(write)) => store.requeue(write),
            }
        }
    }
}

/// Control task - runs the machine
#[embassy_executor::task]
pub async fn control_task(machine: SawMachine) {
    info!("Control task started");

    let now_ms = TICK_SIGNAL.wait().await;
    let mut control = ControlLoop::new(machine, now_ms);

    loop {
        match select(TICK_SIGNAL.wait(), COMMAND_CHANNEL.receive()).await {
            Either::First(now_ms) => control.tick(now_ms),
            Either::Second(command) => commands::apply(&mut control.machine, command),
        }
    }
}
