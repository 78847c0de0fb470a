//! Quadrature encoder input trait

/// Read access to an independent position encoder
pub trait EncoderInput {
    /// Accumulated signed count since power-up
    fn count(&self) -> i32;
}
