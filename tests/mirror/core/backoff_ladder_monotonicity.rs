//! [tests/mirror/core/backoff_ladder_monotonicity.rs]
//! Certifies the pure backoff functions hold their shape regardless of
//! how large a retry count grows: non-decreasing, capped at the
//! ladder's last rung, and always strictly in the future relative to
//! the `now` passed in.

use altmount_core::backoff::{
    healthy_reschedule_at, next_repair_check_at, next_retry_check_at, repair_retry_backoff_minutes,
    retry_backoff_minutes,
};
use chrono::{Duration, Utc};

#[test]
fn retry_backoff_is_non_decreasing_and_capped() {
    let mut previous = 0;
    for retry_count in 1..=20 {
        let minutes = retry_backoff_minutes(retry_count);
        assert!(minutes >= previous, "retry backoff must never shrink as retry_count grows");
        assert!(minutes <= 16, "retry backoff must never exceed the ladder's last rung");
        previous = minutes;
    }
    assert_eq!(retry_backoff_minutes(20), 16, "far past the ladder's length, the last rung holds");
}

#[test]
fn repair_retry_backoff_is_non_decreasing_and_capped() {
    let mut previous = 0;
    for repair_retry_count in 1..=20 {
        let minutes = repair_retry_backoff_minutes(repair_retry_count);
        assert!(minutes >= previous, "repair backoff must never shrink as repair_retry_count grows");
        assert!(minutes <= 30, "repair backoff must never exceed the ladder's last rung");
        previous = minutes;
    }
    assert_eq!(repair_retry_backoff_minutes(20), 30);
}

#[test]
fn retry_backoff_treats_a_zero_or_negative_count_as_the_first_rung() {
    assert_eq!(retry_backoff_minutes(0), retry_backoff_minutes(1));
    assert_eq!(retry_backoff_minutes(-5), retry_backoff_minutes(1));
}

#[test]
fn next_retry_check_at_lands_strictly_after_now() {
    let now = Utc::now();
    let next = next_retry_check_at(now, 1);
    assert!(next > now);
    assert_eq!(next - now, Duration::minutes(1));
}

#[test]
fn next_repair_check_at_lands_strictly_after_now() {
    let now = Utc::now();
    let next = next_repair_check_at(now, 1);
    assert!(next > now);
    assert_eq!(next - now, Duration::minutes(5));
}

#[test]
fn healthy_reschedule_widens_as_release_date_ages() {
    let now = Utc::now();
    let fresh = healthy_reschedule_at(now, Some(now - Duration::days(1))) - now;
    let mid = healthy_reschedule_at(now, Some(now - Duration::days(60))) - now;
    let old = healthy_reschedule_at(now, Some(now - Duration::days(400))) - now;

    assert!(fresh < mid, "a week-old release should recheck sooner than a two-month-old one");
    assert!(mid < old, "a two-month-old release should recheck sooner than a year-old one");
}

#[test]
fn healthy_reschedule_treats_missing_release_date_as_the_oldest_band() {
    let now = Utc::now();
    let unknown = healthy_reschedule_at(now, None) - now;
    let known_old = healthy_reschedule_at(now, Some(now - Duration::days(400))) - now;
    assert_eq!(unknown, known_old);
}
