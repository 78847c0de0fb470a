//! Inter-task communication channels
//!
//! Defines the static channels used for communication between Embassy tasks.
//! Uses embassy-sync primitives for safe async communication.

use core::sync::atomic::AtomicI32;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use kerf_core::MachineStatus;
use kerf_drivers::PendingWrite;

use crate::commands::Command;

/// Channel capacity for operator commands
const COMMAND_CHANNEL_SIZE: usize = 8;

/// Progress writes in flight between the control and persist tasks
const PROGRESS_CHANNEL_SIZE: usize = 2;

/// Operator commands (buttons, future UI adapters)
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, Command, COMMAND_CHANNEL_SIZE> =
    Channel::new();

/// Latest machine snapshot, published by the control task
pub static STATUS: Signal<CriticalSectionRawMutex, MachineStatus> = Signal::new();

/// Progress writes waiting for flash
pub static PROGRESS_WRITES: Channel<CriticalSectionRawMutex, PendingWrite, PROGRESS_CHANNEL_SIZE> =
    Channel::new();

/// Flash commit results; `Err` carries the write back for a retry
pub static PROGRESS_COMMITS: Channel<
    CriticalSectionRawMutex,
    Result<(), PendingWrite>,
    PROGRESS_CHANNEL_SIZE,
> = Channel::new();

/// Fence encoder count, written by the encoder task
pub static ENCODER_COUNT: AtomicI32 = AtomicI32::new(0);
