use super::*;
use crate::checks::{CheckKind, CheckStatus};

fn config() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 5,
        recovery_timeout_seconds: 30 * 60,
    }
}

fn result(status: CheckStatus, at: DateTime<Utc>) -> CheckResult {
    CheckResult::new(
        "A",
        CheckKind::Uptime,
        status,
        std::time::Duration::from_millis(100),
        at,
    )
}

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn open_breaker(now: DateTime<Utc>) -> CircuitBreaker {
    let mut breaker = CircuitBreaker::new("A", config());
    for _ in 0..5 {
        breaker.record(&result(CheckStatus::Failure, now), now);
    }
    assert_eq!(breaker.phase(), BreakerPhase::Open);
    breaker
}

#[test]
fn test_new_breaker_is_closed() {
    let mut breaker = CircuitBreaker::new("A", config());
    assert_eq!(breaker.phase(), BreakerPhase::Closed);
    assert!(breaker.should_attempt(t0()));
    assert_eq!(breaker.state().consecutive_failures(), 0);
}

#[test]
fn test_opens_at_threshold() {
    let now = t0();
    let mut breaker = CircuitBreaker::new("A", config());
    for i in 1..5 {
        assert!(breaker.record(&result(CheckStatus::Failure, now), now).is_none());
        assert_eq!(breaker.state().consecutive_failures(), i);
    }
    let transition = breaker
        .record(&result(CheckStatus::Timeout, now), now)
        .unwrap();
    assert_eq!(transition.from, BreakerPhase::Closed);
    assert_eq!(transition.to, BreakerPhase::Open);
    assert_eq!(breaker.state().opened_at(), Some(now));
    assert_eq!(breaker.state().last_failure_at(), Some(now));
    assert!(!breaker.should_attempt(now));
}

#[test]
fn test_success_and_warning_reset_count() {
    let now = t0();
    let mut breaker = CircuitBreaker::new("A", config());
    for _ in 0..4 {
        breaker.record(&result(CheckStatus::Failure, now), now);
    }
    breaker.record(&result(CheckStatus::Warning, now), now);
    assert_eq!(breaker.state().consecutive_failures(), 0);
    assert_eq!(breaker.phase(), BreakerPhase::Closed);
    // last_failure_at survives the reset
    assert_eq!(breaker.state().last_failure_at(), Some(now));
}

#[test]
fn test_stays_open_before_recovery_timeout() {
    let now = t0();
    let mut breaker = open_breaker(now);
    assert!(!breaker.should_attempt(now + Duration::minutes(29)));
    assert_eq!(breaker.phase(), BreakerPhase::Open);
}

#[test]
fn test_recovers_after_timeout_with_successful_trial() {
    let now = t0();
    let mut breaker = open_breaker(now);

    let later = now + Duration::minutes(31);
    assert!(breaker.should_attempt(later));
    assert_eq!(breaker.phase(), BreakerPhase::HalfOpen);

    let transition = breaker
        .record(&result(CheckStatus::Success, later), later)
        .unwrap();
    assert_eq!(transition.to, BreakerPhase::Closed);
    assert_eq!(breaker.state().consecutive_failures(), 0);
    assert!(breaker.state().opened_at().is_none());
    assert!(breaker.should_attempt(later));
}

#[test]
fn test_failed_trial_reopens_and_restarts_wait() {
    let now = t0();
    let mut breaker = open_breaker(now);

    let trial_time = now + Duration::minutes(31);
    assert!(breaker.should_attempt(trial_time));
    let transition = breaker
        .record(&result(CheckStatus::Failure, trial_time), trial_time)
        .unwrap();
    assert_eq!(transition.from, BreakerPhase::HalfOpen);
    assert_eq!(transition.to, BreakerPhase::Open);
    assert_eq!(breaker.state().opened_at(), Some(trial_time));
    assert!(breaker.state().consecutive_failures() >= 5);

    // Wait restarts from the failed trial
    assert!(!breaker.should_attempt(trial_time + Duration::minutes(29)));
    assert!(breaker.should_attempt(trial_time + Duration::minutes(30)));
}

#[test]
fn test_half_open_admits_single_trial() {
    let now = t0();
    let mut breaker = open_breaker(now);
    let later = now + Duration::minutes(31);
    assert!(breaker.should_attempt(later));
    assert!(!breaker.should_attempt(later));
}

#[test]
fn test_record_while_open_is_ignored() {
    let now = t0();
    let mut breaker = open_breaker(now);
    let before = breaker.snapshot();
    assert!(breaker
        .record(&result(CheckStatus::Success, now), now)
        .is_none());
    assert_eq!(breaker.snapshot(), before);
}

#[test]
fn test_restore_half_open_resumes_as_open() {
    let now = t0();
    let mut breaker = open_breaker(now);
    assert!(breaker.should_attempt(now + Duration::minutes(31)));
    let persisted = breaker.snapshot();
    assert_eq!(persisted.phase(), BreakerPhase::HalfOpen);

    let mut restored = CircuitBreaker::restore("A", config(), persisted);
    assert_eq!(restored.phase(), BreakerPhase::Open);
    assert!(restored.should_attempt(now + Duration::minutes(32)));
}

#[test]
fn test_restore_raises_count_to_threshold() {
    let now = t0();
    let breaker = open_breaker(now);
    let stricter = BreakerConfig {
        failure_threshold: 8,
        ..config()
    };
    let restored = CircuitBreaker::restore("A", stricter, breaker.snapshot());
    assert_eq!(restored.state().consecutive_failures(), 8);
}

#[test]
fn test_state_serde_round_trip_and_defaults() {
    let now = t0();
    let breaker = open_breaker(now);
    let json = serde_json::to_string(&breaker.snapshot()).unwrap();
    assert!(json.contains("\"phase\":\"open\""));
    let parsed: BreakerState = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, breaker.snapshot());

    let empty: BreakerState = serde_json::from_str("{}").unwrap();
    assert_eq!(empty, BreakerState::default());
}

#[test]
fn test_open_implies_threshold_reached() {
    // Drive an arbitrary sequence and check the invariant after each step
    let mut now = t0();
    let mut breaker = CircuitBreaker::new("A", config());
    let pattern = [
        CheckStatus::Failure,
        CheckStatus::Failure,
        CheckStatus::Success,
        CheckStatus::Failure,
        CheckStatus::Timeout,
        CheckStatus::Failure,
        CheckStatus::Failure,
        CheckStatus::Failure,
        CheckStatus::Failure,
        CheckStatus::Success,
    ];
    for _ in 0..4 {
        for status in pattern {
            if breaker.should_attempt(now) {
                breaker.record(&result(status, now), now);
            }
            if breaker.phase() == BreakerPhase::Open {
                assert!(breaker.state().consecutive_failures() >= 5);
            }
            now += Duration::minutes(7);
        }
    }
}
