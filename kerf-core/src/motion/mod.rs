//! Axis geometry
//!
//! Unit conversion, soft travel limits and the positional tolerances shared
//! by every state machine that decides "have we arrived yet".

pub mod position;

pub use position::{
    fabs, round_steps, within, Axis, Calibration, SoftLimits, ARRIVAL_TOLERANCE,
    FEED_TARGET_TOLERANCE, SEQUENCE_TOLERANCE,
};
