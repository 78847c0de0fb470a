//! Progress storage trait
//!
//! Persists the index of the last completed cut so a batch survives a power
//! loss. Writes happen once per completed cut.

/// Errors from progress storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Backing storage could not be reached
    Unavailable,
    /// Stored record failed validation
    Corrupted,
}

/// Persistent store for batch progress
pub trait ProgressStore {
    /// Load the last completed cut index, 0 when nothing is stored
    fn load(&mut self) -> Result<u32, StoreError>;

    /// Persist the last completed cut index
    fn save(&mut self, last_completed: u32) -> Result<(), StoreError>;

    /// Forget stored progress
    fn clear(&mut self) -> Result<(), StoreError>;
}
