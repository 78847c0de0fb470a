//! Step pulse output abstraction
//!
//! A step generator turns a requested rate into a square wave on the step
//! pin. Profiles and position accounting live above this trait; the
//! implementation only has to hold the rate until told otherwise.

/// Step/direction pulse generator
pub trait StepOutput {
    /// Emit steps at `steps_per_s`, 0 stops the pulse train
    fn set_rate(&mut self, steps_per_s: u32);

    /// Select the direction line, `true` drives toward positive counts
    fn set_direction(&mut self, forward: bool);

    /// Drive the enable line
    fn set_enabled(&mut self, enabled: bool);

    /// Highest rate the generator can produce
    fn max_rate(&self) -> u32 {
        u32::MAX
    }
}
