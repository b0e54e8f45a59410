//! Exponential backoff schedule

use market_data_service::Backoff;
use rstest::*;
use std::time::Duration;

#[fixture]
fn backoff() -> Backoff {
    Backoff::new(Duration::from_secs(1), Duration::from_secs(60))
}

#[rstest]
fn test_delays_double_from_base(mut backoff: Backoff) {
    let delays: Vec<u64> = (0..8).map(|_| backoff.on_failure().as_secs()).collect();

    assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    assert_eq!(backoff.failures(), 8);
}

#[rstest]
#[case(1, 1)]
#[case(3, 4)]
#[case(6, 32)]
#[case(7, 60)]
#[case(40, 60)]
fn test_delay_after_n_failures(mut backoff: Backoff, #[case] failures: u32, #[case] expected_secs: u64) {
    let mut delay = Duration::ZERO;
    for _ in 0..failures {
        delay = backoff.on_failure();
    }

    assert_eq!(delay, Duration::from_secs(expected_secs));
}

#[rstest]
fn test_reset_restarts_from_base(mut backoff: Backoff) {
    backoff.on_failure();
    backoff.on_failure();
    backoff.on_failure();

    backoff.reset();

    assert_eq!(backoff.failures(), 0);
    assert_eq!(backoff.on_failure(), Duration::from_secs(1));
    assert_eq!(backoff.on_failure(), Duration::from_secs(2));
}

#[test]
fn test_custom_base_and_cap() {
    let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(50));

    let delays: Vec<u128> = (0..5).map(|_| backoff.on_failure().as_millis()).collect();

    assert_eq!(delays, vec![10, 20, 40, 50, 50]);
}
