//! Persisted state loading
//!
//! Loads the machine configuration and the stored cut progress from flash
//! at boot. The configuration falls back to compiled defaults when flash is
//! empty or holds a layout from another firmware version.

use defmt::*;

use kerf_core::config::{MachineConfig, CONFIG_VERSION};
use kerf_core::sequence::MAX_PROGRESS_RECORD_SIZE;
use kerf_hal_rp2040::flash::{FlashError, Rp2040FlashStorage, StorageKey};
// Import the FlashStorage trait to bring methods into scope
use kerf_hal_rp2040::FlashStorageTrait;

/// Maximum serialized config size (binary)
const MAX_CONFIG_SIZE: usize = 512;

/// Configuration persistence errors
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Flash operation failed
    Flash(FlashError),
    /// Deserialization failed
    Deserialize,
    /// Config version mismatch
    VersionMismatch,
}

impl From<FlashError> for ConfigError {
    fn from(e: FlashError) -> Self {
        ConfigError::Flash(e)
    }
}

/// Persisted state manager
///
/// Owns the flash storage during boot. Hand it on to the persist task with
/// [`ConfigPersistence::into_storage`] once everything is loaded.
pub struct ConfigPersistence<'d> {
    storage: Rp2040FlashStorage<'d>,
}

impl<'d> ConfigPersistence<'d> {
    pub fn new(storage: Rp2040FlashStorage<'d>) -> Self {
        Self { storage }
    }

    /// Consume this persistence manager and return the underlying storage
    pub fn into_storage(self) -> Rp2040FlashStorage<'d> {
        self.storage
    }

    /// Load the configuration from flash or fall back to the defaults
    pub async fn load_or_default(&mut self) -> MachineConfig {
        match self.load().await {
            Ok(config) => {
                info!("Loaded configuration from flash");
                config
            }
            Err(ConfigError::Flash(FlashError::NotFound)) => {
                info!("No configuration in flash, using defaults");
                MachineConfig::default()
            }
            Err(e) => {
                warn!("Stored configuration unusable ({}), using defaults", e);
                MachineConfig::default()
            }
        }
    }

    /// Load configuration from binary postcard format
    pub async fn load(&mut self) -> Result<MachineConfig, ConfigError> {
        let mut buffer = [0u8; MAX_CONFIG_SIZE];
        let len = self
            .storage
            .read(StorageKey::MachineConfig, &mut buffer)
            .await?;

        debug!("Read {} bytes of binary config from flash", len);

        let config: MachineConfig =
            postcard::from_bytes(&buffer[..len]).map_err(|_| ConfigError::Deserialize)?;

        if !config.is_current() {
            warn!(
                "Config version mismatch: found {}, expected {}",
                config.version, CONFIG_VERSION
            );
            return Err(ConfigError::VersionMismatch);
        }

        log_config_summary(&config);
        Ok(config)
    }

    /// Read the encoded progress record into `buffer`, `None` when nothing is stored
    pub async fn load_progress<'b>(
        &mut self,
        buffer: &'b mut [u8; MAX_PROGRESS_RECORD_SIZE],
    ) -> Option<&'b [u8]> {
        match self.storage.read(StorageKey::CutProgress, &mut buffer[..]).await {
            Ok(len) => {
                debug!("Read {} bytes of progress from flash", len);
                Some(&buffer[..len])
            }
            Err(FlashError::NotFound) => None,
            Err(e) => {
                warn!("Progress read failed: {}", e);
                None
            }
        }
    }
}

/// Log a summary of the loaded configuration
fn log_config_summary(config: &MachineConfig) {
    debug!(
        "  fence {} steps/unit, travel {}",
        config.x.steps_per_unit, config.x.max_travel
    );
    debug!(
        "  table cut {} -> {}, retract {}",
        config.sequence.cut_start_y, config.sequence.cut_stop_y, config.sequence.retract_y
    );
    debug!(
        "  torque target {}%, auto reset {}",
        config.sequence.torque_target, config.safety.auto_reset
    );
}
