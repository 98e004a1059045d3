//! [crates/core/src/backoff.rs]
//! =================================================================
//! APARATO: BACKOFF LADDERS (ESTRATO L4)
//! RESPONSABILIDAD: FUNCIONES PURAS DE PROGRAMACION DE REINTENTOS
//!
//! Pure functions of `(retry_count) -> Duration`, kept out of SQL so the
//! ladder is testable in isolation. The health repository only ever
//! persists the timestamp these produce; it has no ladder logic of its
//! own.
//! =================================================================

use chrono::{DateTime, Duration as ChronoDuration, Utc};

const RETRY_BACKOFF_MINUTES: [i64; 5] = [1, 2, 4, 8, 16];
const REPAIR_RETRY_BACKOFF_MINUTES: [i64; 4] = [5, 10, 20, 30];

/// Minutes to wait before the next health recheck after a `partial`
/// verdict, indexed by the retry count *after* incrementing (1-based).
/// Capped at the ladder's last rung once `retry_count` exceeds its length.
pub fn retry_backoff_minutes(retry_count: i32) -> i64 {
    ladder_lookup(&RETRY_BACKOFF_MINUTES, retry_count)
}

/// Minutes to wait before the next repair-notification attempt, indexed
/// by repair-retry count the same way as `retry_backoff_minutes`.
pub fn repair_retry_backoff_minutes(repair_retry_count: i32) -> i64 {
    ladder_lookup(&REPAIR_RETRY_BACKOFF_MINUTES, repair_retry_count)
}

fn ladder_lookup(ladder: &[i64], count: i32) -> i64 {
    let index = count.max(1) as usize - 1;
    ladder[index.min(ladder.len() - 1)]
}

/// Absolute timestamp for the next retry check, given the retry count
/// the row will have *after* this failure is recorded.
pub fn next_retry_check_at(now: DateTime<Utc>, retry_count_after: i32) -> DateTime<Utc> {
    now + ChronoDuration::minutes(retry_backoff_minutes(retry_count_after))
}

/// Absolute timestamp for the next repair-notification attempt.
pub fn next_repair_check_at(now: DateTime<Utc>, repair_retry_count_after: i32) -> DateTime<Utc> {
    now + ChronoDuration::minutes(repair_retry_backoff_minutes(repair_retry_count_after))
}

/// Age-band reschedule for a `healthy` verdict; the bands are a judgment
/// call, not a recovered constant. `release_date` of `None` is treated
/// as the oldest band.
pub fn healthy_reschedule_at(
    now: DateTime<Utc>,
    release_date: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let age = release_date.map(|d| now.signed_duration_since(d));

    let delay = match age {
        Some(age) if age < ChronoDuration::days(7) => ChronoDuration::hours(6),
        Some(age) if age < ChronoDuration::days(30) => ChronoDuration::hours(24),
        Some(age) if age < ChronoDuration::days(180) => ChronoDuration::hours(72),
        _ => ChronoDuration::days(7),
    };

    now + delay
}
