use crate::error::readiness::ReadinessError;
use crate::readiness::readiness_channel;

use std::time::Duration;

#[tokio::test]
async fn given_signal_fired_when_waited_then_returns_url() {
    let (signal, wait) = readiness_channel();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.signal("http://127.0.0.1:8080/");
    });

    let url = wait.wait(Duration::from_secs(1)).await.expect("ready");
    assert_eq!(url, "http://127.0.0.1:8080/");
}

/// **VALUE**: The wait is bounded.
///
/// **BUG THIS CATCHES**: A startup that hangs forever because nothing ever
/// signals readiness.
#[tokio::test]
async fn given_no_signal_when_waited_then_times_out() {
    let (_signal, wait) = readiness_channel();

    let err = wait
        .wait(Duration::from_millis(20))
        .await
        .expect_err("should time out");

    assert!(matches!(err, ReadinessError::Timeout { .. }));
}

/// **BUG THIS CATCHES**: An async wait pointing its error location at a
/// compiler-generated frame instead of a line in the readiness module.
#[tokio::test]
async fn given_timeout_when_waited_then_location_inside_readiness_module() {
    let (_signal, wait) = readiness_channel();

    let err = wait
        .wait(Duration::from_millis(5))
        .await
        .expect_err("should time out");

    let ReadinessError::Timeout { location, .. } = err else {
        panic!("expected Timeout");
    };
    assert!(location.file.ends_with("readiness.rs"), "got {}", location.file);
    assert!(!location.file.contains("tests"), "got {}", location.file);
}

#[tokio::test]
async fn given_signal_dropped_when_waited_then_abandoned() {
    let (signal, wait) = readiness_channel();
    drop(signal);

    let err = wait
        .wait(Duration::from_secs(5))
        .await
        .expect_err("should be abandoned");

    assert!(matches!(err, ReadinessError::Abandoned { .. }));
}

#[tokio::test]
async fn given_timeout_when_wait_or_continue_then_none() {
    let (_signal, wait) = readiness_channel();

    assert_eq!(wait.wait_or_continue(Duration::from_millis(10)).await, None);
}

#[test]
fn given_waiter_gone_when_signalled_then_does_not_panic() {
    let (signal, wait) = readiness_channel();
    drop(wait);

    signal.signal("http://127.0.0.1:1/");
}
