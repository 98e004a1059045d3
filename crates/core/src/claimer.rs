//! [crates/core/src/claimer.rs]
//! =================================================================
//! APARATO: CLAIM RETRY WRAPPER (ESTRATO L4)
//! RESPONSABILIDAD: REINTENTO ACOTADO FRENTE A CONTENCION DEL STORE
//! =================================================================

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use altmount_db::QueueRepository;
use altmount_models::queue::QueueEntry;

use crate::errors::{CoreError, CoreResult};

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY_MS: u64 = 50;
const MAX_DELAY_MS: u64 = 5_000;
const JITTER_MAX_MS: u64 = 1_000;

/// Wraps `QueueRepository::claim_next` with bounded retry for
/// contention errors only. All other errors surface immediately.
#[derive(Clone)]
pub struct Claimer {
    queue: QueueRepository,
}

impl Claimer {
    pub fn new(queue: QueueRepository) -> Self {
        Self { queue }
    }

    /// Returns `Ok(None)` when no work is available — callers must not
    /// treat that as an error. Returns `Err(CoreError::Contention)` only
    /// once the retry budget for contention is exhausted; any
    /// non-contention store error propagates on the first attempt.
    #[instrument(skip(self))]
    pub async fn claim_with_retry(&self) -> CoreResult<Option<QueueEntry>> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.queue.claim_next().await {
                Ok(entry) => return Ok(entry),
                Err(store_error) if store_error.is_contention() => {
                    if attempt >= MAX_ATTEMPTS {
                        warn!("[CLAIMER]: contention retries exhausted after {attempt} attempts");
                        return Err(CoreError::Contention);
                    }

                    let delay = backoff_delay(attempt);
                    if attempt == 1 {
                        debug!("[CLAIMER]: contention on attempt {attempt}, retrying in {delay:?}");
                    } else {
                        warn!("[CLAIMER]: contention on attempt {attempt}, retrying in {delay:?}");
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(CoreError::Store(other)),
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponential_ms = BASE_DELAY_MS.saturating_mul(1u64 << (attempt.saturating_sub(1)));
    let capped_ms = exponential_ms.min(MAX_DELAY_MS);
    let jitter_ms = rand::thread_rng().gen_range(0..=JITTER_MAX_MS);
    Duration::from_millis(capped_ms + jitter_ms)
}
