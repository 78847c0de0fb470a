//! Operator commands
//!
//! Everything that can change the machine from outside the control loop
//! arrives here as a [`Command`] and is applied between ticks. Rejections
//! are logged and dropped; the operator sees the result in the status.

use defmt::*;

use kerf_core::cycle::CycleKind;
use kerf_core::motion::Axis;

use crate::board::SawMachine;

/// Command surface of the machine
#[derive(Debug, Clone, Copy, PartialEq, Format)]
pub enum Command {
    Home(Axis),
    HomeAll,
    MoveAxis { axis: Axis, position: f32, scale: f32 },
    Jog { axis: Axis, delta: f32, scale: f32 },
    StopAll,
    EmergencyStop,
    ClearAlerts(Axis),
    BuildPositions { zero: f32, increment: f32, count: u16 },
    SetBatchSize(u32),
    ResetProgress,
    SelectCycle(CycleKind),
    StartCycle,
    PauseCycle,
    ResumeCycle,
    FeedHold,
    ExitFeedHold,
    FeedToStop,
    FinishSemi,
    CancelCycle,
    ForceReset,
    SetSemiFeedRate(f32),
    SetTorqueTarget(f32),
    SafetyReset,
}

/// Apply one command to the machine
pub fn apply(machine: &mut SawMachine, command: Command) {
    debug!("Command: {}", command);

    let result = match command {
        Command::Home(axis) => machine.home(axis),
        Command::HomeAll => machine.home_all(),
        Command::MoveAxis { axis, position, scale } => machine.move_axis(axis, position, scale),
        Command::Jog { axis, delta, scale } => machine.jog(axis, delta, scale),
        Command::StopAll => {
            machine.stop_all();
            Ok(())
        }
        Command::EmergencyStop => {
            machine.emergency_stop();
            Ok(())
        }
        Command::ClearAlerts(axis) => machine.clear_alerts(axis),
        Command::BuildPositions { zero, increment, count } => {
            machine.build_positions(zero, increment, count as usize)
        }
        Command::SetBatchSize(size) => {
            let accepted = machine.set_batch_size(size);
            if accepted != size {
                info!("Batch size clamped to {}", accepted);
            }
            Ok(())
        }
        Command::ResetProgress => machine.reset_progress(),
        Command::SelectCycle(kind) => machine.select_cycle(kind),
        Command::StartCycle => machine.start_cycle(),
        Command::PauseCycle => machine.pause_cycle(),
        Command::ResumeCycle => machine.resume_cycle(),
        Command::FeedHold => machine.feed_hold(),
        Command::ExitFeedHold => machine.exit_feed_hold(),
        Command::FeedToStop => machine.feed_to_stop(),
        Command::FinishSemi => machine.finish_semi(),
        Command::CancelCycle => {
            machine.cancel_cycle();
            Ok(())
        }
        Command::ForceReset => {
            machine.force_reset();
            Ok(())
        }
        Command::SetSemiFeedRate(ipm) => machine.set_semi_feed_rate(ipm).map(|scale| {
            debug!("Semi feed scale {}", scale);
        }),
        Command::SetTorqueTarget(percent) => {
            let accepted = machine.set_torque_target(percent);
            debug!("Torque target {}%", accepted);
            Ok(())
        }
        Command::SafetyReset => machine.request_safety_reset(),
    };

    if let Err(e) = result {
        warn!("Command {} rejected: {}", command, e);
    }
}
