//! Panel buttons
//!
//! Cycle start, feed hold and reset on the control panel. Each press
//! becomes a [`Command`]; what it means depends on the last status seen:
//! reset releases a safety trip first, then abandons a feed hold, then
//! cancels the cycle.

use defmt::*;
use embassy_futures::select::{select3, Either3};
use embassy_rp::gpio::Input;
use embassy_time::Timer;

use kerf_core::cycle::{AutoState, CycleStatus};

use crate::channels::{COMMAND_CHANNEL, STATUS};
use crate::commands::Command;

/// Contact bounce settle time
const DEBOUNCE_MS: u64 = 20;

/// Active-low panel buttons
pub struct PanelButtons {
    pub start: Input<'static>,
    pub hold: Input<'static>,
    pub reset: Input<'static>,
}

#[derive(Clone, Copy, Format)]
enum Button {
    Start,
    Hold,
    Reset,
}

#[embassy_executor::task]
pub async fn buttons_task(mut buttons: PanelButtons) {
    info!("Button task started");

    let mut holding = false;
    let mut tripped = false;

    loop {
        let pressed = match select3(
            buttons.start.wait_for_falling_edge(),
            buttons.hold.wait_for_falling_edge(),
            buttons.reset.wait_for_falling_edge(),
        )
        .await
        {
            Either3::First(()) => Button::Start,
            Either3::Second(()) => Button::Hold,
            Either3::Third(()) => Button::Reset,
        };

        Timer::after_millis(DEBOUNCE_MS).await;
        let still_down = match pressed {
            Button::Start => buttons.start.is_low(),
            Button::Hold => buttons.hold.is_low(),
            Button::Reset => buttons.reset.is_low(),
        };
        if !still_down {
            continue;
        }
        debug!("Button {}", pressed);

        if let Some(status) = STATUS.try_take() {
            holding = status.cycle == CycleStatus::AutoCut(AutoState::Paused);
            tripped = status.safety_tripped;
        }

        let command = match pressed {
            // Feed hold toggles, so start while held resumes the cut
            Button::Start if holding => Command::FeedHold,
            Button::Start => Command::StartCycle,
            Button::Hold => Command::FeedHold,
            Button::Reset if tripped => Command::SafetyReset,
            Button::Reset if holding => Command::ExitFeedHold,
            Button::Reset => Command::CancelCycle,
        };
        COMMAND_CHANNEL.send(command).await;
    }
}
