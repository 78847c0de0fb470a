//! Progress persist task
//!
//! Commits progress writes from the control loop to flash and reports the
//! outcome back. Flash erase can stall for tens of milliseconds, which is
//! why this never runs inside the control loop.

use defmt::*;

use kerf_core::sequence::MAX_PROGRESS_RECORD_SIZE;
use kerf_drivers::{encode_record, PendingWrite};
use kerf_hal_rp2040::{FlashStorageTrait, Rp2040FlashStorage, StorageKey};

use crate::channels::{PROGRESS_COMMITS, PROGRESS_WRITES};

/// Persist task - owns the flash after boot
#[embassy_executor::task]
pub async fn persist_task(mut storage: Rp2040FlashStorage<'static>) {
    info!("Persist task started");

    let mut buffer = [0u8; MAX_PROGRESS_RECORD_SIZE];

    loop {
        let write = PROGRESS_WRITES.receive().await;

        let committed = match write {
            PendingWrite::Save(record) => match encode_record(&record, &mut buffer) {
                Ok(bytes) => match storage.write(StorageKey::CutProgress, bytes).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Progress write failed: {}", e);
                        false
                    }
                },
                Err(e) => {
                    error!("Progress record not encoded: {}", e);
                    false
                }
            },
            PendingWrite::Clear => match storage.remove(StorageKey::CutProgress).await {
                Ok(()) => true,
                Err(e) => {
                    error!("Progress erase failed: {}", e);
                    false
                }
            },
        };

        if committed {
            debug!("Progress committed: {}", write);
            PROGRESS_COMMITS.send(Ok(())).await;
        } else {
            PROGRESS_COMMITS.send(Err(write)).await;
        }
    }
}
