//! Sequence state machine definition

/// Sequence states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceState {
    Idle,
    /// Table backing off to the retract position
    MovingToRetract,
    /// Fence moving to the current cut position
    MovingToX,
    /// Table approaching the cut start
    MovingToStart,
    /// Torque-fed cut toward the cut stop
    Cutting,
    /// Table returning to retract after a cut
    Retracting,
    /// Feed hold
    Paused,
    /// Batch finished
    Completed,
    /// Batch aborted
    Aborted,
}

/// Events that drive sequence transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceEvent {
    Start,
    RetractReached,
    XReached,
    StartReached,
    CutFinished,
    /// Batch has more cuts
    NextPosition,
    /// Batch quota or list exhausted
    BatchFinished,
    Abort,
    /// Operator acknowledged a finished or aborted batch
    Acknowledge,
}

impl SequenceState {
    /// States in which axes are being commanded
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SequenceState::MovingToRetract
                | SequenceState::MovingToX
                | SequenceState::MovingToStart
                | SequenceState::Cutting
                | SequenceState::Retracting
        )
    }

    /// Running or paused
    pub fn is_active(&self) -> bool {
        self.is_running() || *self == SequenceState::Paused
    }

    /// Finished states waiting for acknowledgement
    pub fn is_terminal(&self) -> bool {
        matches!(self, SequenceState::Completed | SequenceState::Aborted)
    }

    /// Process an event and return the next state
    ///
    /// Unknown pairs leave the state unchanged. Pause and resume are not
    /// table driven: resuming needs to know where the pause happened.
    pub fn transition(self, event: SequenceEvent) -> Self {
        use SequenceEvent::*;
        use SequenceState::*;

        match (self, event) {
            (Idle, Start) => MovingToRetract,

            (MovingToRetract, RetractReached) => MovingToX,
            (MovingToX, XReached) => MovingToStart,
            (MovingToStart, StartReached) => Cutting,
            (Cutting, CutFinished) => Retracting,
            (Retracting, NextPosition) => MovingToX,
            (Retracting, BatchFinished) => Completed,

            (state, Abort) if state.is_active() => Aborted,

            (Completed, Acknowledge) | (Aborted, Acknowledge) => Idle,

            (state, _) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cut_cycle() {
        let mut state = SequenceState::Idle;
        for (event, expected) in [
            (SequenceEvent::Start, SequenceState::MovingToRetract),
            (SequenceEvent::RetractReached, SequenceState::MovingToX),
            (SequenceEvent::XReached, SequenceState::MovingToStart),
            (SequenceEvent::StartReached, SequenceState::Cutting),
            (SequenceEvent::CutFinished, SequenceState::Retracting),
            (SequenceEvent::NextPosition, SequenceState::MovingToX),
        ] {
            state = state.transition(event);
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_batch_finish_and_acknowledge() {
        let state = SequenceState::Retracting.transition(SequenceEvent::BatchFinished);
        assert_eq!(state, SequenceState::Completed);
        assert!(state.is_terminal());
        assert_eq!(state.transition(SequenceEvent::Acknowledge), SequenceState::Idle);
    }

    #[test]
    fn test_abort_from_any_active_state() {
        for state in [
            SequenceState::MovingToRetract,
            SequenceState::MovingToX,
            SequenceState::MovingToStart,
            SequenceState::Cutting,
            SequenceState::Retracting,
            SequenceState::Paused,
        ] {
            assert_eq!(state.transition(SequenceEvent::Abort), SequenceState::Aborted);
        }
        assert_eq!(
            SequenceState::Idle.transition(SequenceEvent::Abort),
            SequenceState::Idle
        );
        assert_eq!(
            SequenceState::Completed.transition(SequenceEvent::Abort),
            SequenceState::Completed
        );
    }

    #[test]
    fn test_invalid_events_are_ignored() {
        assert_eq!(
            SequenceState::Idle.transition(SequenceEvent::CutFinished),
            SequenceState::Idle
        );
        assert_eq!(
            SequenceState::Cutting.transition(SequenceEvent::Start),
            SequenceState::Cutting
        );
        assert_eq!(
            SequenceState::MovingToX.transition(SequenceEvent::Acknowledge),
            SequenceState::MovingToX
        );
    }

    #[test]
    fn test_state_classes() {
        assert!(SequenceState::Cutting.is_running());
        assert!(!SequenceState::Paused.is_running());
        assert!(SequenceState::Paused.is_active());
        assert!(!SequenceState::Idle.is_active());
        assert!(!SequenceState::Aborted.is_active());
    }
}
