//! Servo driver implementations
//!
//! - [`StepDirServo`]: step/direction closed-loop servo driven through a
//!   pulse generator with a software trapezoidal profile

pub mod profile;
pub mod step_dir;

pub use profile::{ProfileState, TrapezoidProfile};
pub use step_dir::{torque_from_duty, ServoMotion, StepDirServo};
