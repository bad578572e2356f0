use crate::error::readiness::ReadinessError;
use crate::error::supervisor::{StartError, StopError};
use crate::readiness::DEFAULT_READINESS_TIMEOUT;
use crate::supervisor::{LifecycleStatus, ServerSupervisor, WorkerSupervisor};
use crate::tests::support::{
    BusBehaviour, CountingInitializer, MOCK_URL, MockFactory, guard_for,
};

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    initializer: Arc<CountingInitializer>,
    factory: Arc<MockFactory>,
    supervisor: ServerSupervisor,
}

fn server_fixture(behaviour: BusBehaviour) -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path().join("kolibri");
    let initializer = Arc::new(CountingInitializer::default());
    let factory = MockFactory::new(behaviour);
    let supervisor = ServerSupervisor::new(
        &home,
        guard_for(&home, Arc::clone(&initializer)),
        Arc::clone(&factory) as _,
    );

    Fixture {
        _dir: dir,
        initializer,
        factory,
        supervisor,
    }
}

/// **VALUE**: The basic start → url → stop → no url contract.
///
/// **BUG THIS CATCHES**: A URL left cached after stop, which would send the
/// UI to a dead address.
#[tokio::test]
async fn given_stopped_server_when_started_and_stopped_then_url_follows_lifecycle() {
    // GIVEN: A stopped supervisor
    let fx = server_fixture(BusBehaviour::default());
    assert_eq!(fx.supervisor.get_url().await, None);
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Stopped);

    // WHEN: Started
    let url = fx.supervisor.start().await.expect("start");

    // THEN: URL cached and Running
    assert_eq!(url, MOCK_URL);
    assert_eq!(fx.supervisor.get_url().await.as_deref(), Some(MOCK_URL));
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Running);

    // WHEN: Stopped
    fx.supervisor.stop().await.expect("stop");

    // THEN: URL gone
    assert_eq!(fx.supervisor.get_url().await, None);
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Stopped);
    assert_eq!(fx.factory.counters.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_stopped_server_when_stop_called_then_no_op() {
    let fx = server_fixture(BusBehaviour::default());

    fx.supervisor.stop().await.expect("stop");
    fx.supervisor.stop().await.expect("stop again");

    assert_eq!(fx.factory.counters.created.load(Ordering::SeqCst), 0);
    assert_eq!(fx.factory.counters.stops.load(Ordering::SeqCst), 0);
}

/// **VALUE**: A setup failure aborts start before any server is created.
#[tokio::test]
async fn given_setup_fails_when_started_then_setup_error_and_server_never_created() {
    let fx = server_fixture(BusBehaviour::default());
    fx.initializer.fail.store(true, Ordering::SeqCst);

    let err = fx.supervisor.start().await.expect_err("start should fail");

    assert!(matches!(err, StartError::Setup { .. }), "got {err}");
    assert_eq!(fx.factory.counters.created.load(Ordering::SeqCst), 0);
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Stopped);
}

#[tokio::test]
async fn given_server_start_fails_when_started_then_runtime_error_and_stopped() {
    let fx = server_fixture(BusBehaviour {
        fail_start: true,
        ..Default::default()
    });

    let err = fx.supervisor.start().await.expect_err("start should fail");

    assert!(matches!(err, StartError::Runtime { .. }));
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Stopped);
    assert_eq!(fx.supervisor.get_url().await, None);
}

/// **BUG THIS CATCHES**: A server that started but never reported its address
/// being left running with nobody able to reach or stop it.
#[tokio::test]
async fn given_server_reports_no_url_when_started_then_server_is_stopped_again() {
    let fx = server_fixture(BusBehaviour {
        fail_url: true,
        ..Default::default()
    });

    let err = fx.supervisor.start().await.expect_err("start should fail");

    assert!(matches!(err, StartError::Runtime { .. }));
    assert_eq!(fx.factory.counters.stops.load(Ordering::SeqCst), 1);
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Stopped);
}

#[tokio::test]
async fn given_running_server_when_started_again_then_invalid_state() {
    let fx = server_fixture(BusBehaviour::default());
    fx.supervisor.start().await.expect("start");

    let err = fx.supervisor.start().await.expect_err("second start");

    assert!(matches!(err, StartError::InvalidState { .. }));
    assert_eq!(fx.factory.counters.starts.load(Ordering::SeqCst), 1);
}

/// **VALUE**: Many callers binding at once share one start.
#[tokio::test]
async fn given_concurrent_binds_when_server_stopped_then_started_once() {
    let fx = server_fixture(BusBehaviour {
        start_delay: Some(Duration::from_millis(50)),
        ..Default::default()
    });

    let binds: Vec<_> = (0..5)
        .map(|_| {
            let supervisor = fx.supervisor.clone();
            tokio::spawn(async move { supervisor.bind().await })
        })
        .collect();

    for bind in binds {
        let url = bind.await.expect("join").expect("bind");
        assert_eq!(url, MOCK_URL);
    }

    assert_eq!(fx.factory.counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(fx.initializer.calls.load(Ordering::SeqCst), 1);
}

/// **VALUE**: Stop issued while a start is in flight waits for it, then stops.
#[tokio::test]
async fn given_start_in_flight_when_stop_called_then_ends_stopped() {
    let fx = server_fixture(BusBehaviour {
        start_delay: Some(Duration::from_millis(100)),
        ..Default::default()
    });

    let starter = {
        let supervisor = fx.supervisor.clone();
        tokio::spawn(async move { supervisor.start().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Starting);

    fx.supervisor.stop().await.expect("stop");

    starter.await.expect("join").expect("start");
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Stopped);
    assert_eq!(fx.supervisor.get_url().await, None);
}

#[tokio::test]
async fn given_stop_fails_when_stopped_then_state_still_stopped() {
    let fx = server_fixture(BusBehaviour {
        fail_stop: true,
        ..Default::default()
    });
    fx.supervisor.start().await.expect("start");

    let err = fx.supervisor.stop().await.expect_err("stop should fail");

    assert!(matches!(err, StopError::Runtime { .. }));
    assert_eq!(fx.supervisor.status().await, LifecycleStatus::Stopped);
    assert_eq!(fx.supervisor.get_url().await, None);
}

#[tokio::test]
async fn given_background_start_when_waited_then_receives_url() {
    let fx = server_fixture(BusBehaviour::default());

    let wait = fx.supervisor.start_in_background();
    let url = wait.wait(DEFAULT_READINESS_TIMEOUT).await.expect("ready");

    assert_eq!(url, MOCK_URL);
    assert_eq!(fx.supervisor.get_url().await.as_deref(), Some(MOCK_URL));
}

/// **VALUE**: A failed background start is reported to the waiter at once.
#[tokio::test]
async fn given_background_start_fails_when_waited_then_abandoned_not_timeout() {
    let fx = server_fixture(BusBehaviour {
        fail_start: true,
        ..Default::default()
    });

    let wait = fx.supervisor.start_in_background();
    let err = wait
        .wait(Duration::from_secs(30))
        .await
        .expect_err("should not be ready");

    assert!(matches!(err, ReadinessError::Abandoned { .. }));
}

/// **VALUE**: Worker and server lifecycles are independent.
///
/// **BUG THIS CATCHES**: A worker failure leaking into server startup (or
/// vice versa) through shared state.
#[tokio::test]
async fn given_worker_fails_when_server_started_then_server_unaffected() {
    // GIVEN: One home, one setup guard, a failing worker and a healthy server
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path().join("kolibri");
    let initializer = Arc::new(CountingInitializer::default());
    let guard = guard_for(&home, Arc::clone(&initializer));

    let worker_factory = MockFactory::new(BusBehaviour {
        fail_start: true,
        ..Default::default()
    });
    let server_factory = MockFactory::new(BusBehaviour::default());

    let worker = WorkerSupervisor::new(&home, Arc::clone(&guard), worker_factory as _);
    let server = ServerSupervisor::new(&home, Arc::clone(&guard), server_factory as _);

    // WHEN: Both start concurrently
    let (worker_result, server_result) = tokio::join!(worker.start(), server.start());

    // THEN: Worker failed, server running, setup ran once for both
    assert!(matches!(worker_result, Err(StartError::Runtime { .. })));
    assert_eq!(server_result.expect("server start"), MOCK_URL);
    assert_eq!(worker.status().await, LifecycleStatus::Stopped);
    assert_eq!(server.status().await, LifecycleStatus::Running);
    assert_eq!(initializer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_running_worker_when_stopped_then_stopped_and_stop_is_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path().join("kolibri");
    let factory = MockFactory::new(BusBehaviour::default());
    let worker = WorkerSupervisor::new(
        &home,
        guard_for(&home, Arc::new(CountingInitializer::default())),
        Arc::clone(&factory) as _,
    );

    worker.start().await.expect("start");
    assert_eq!(worker.status().await, LifecycleStatus::Running);

    worker.stop().await.expect("stop");
    worker.stop().await.expect("stop again");

    assert_eq!(worker.status().await, LifecycleStatus::Stopped);
    assert_eq!(factory.counters.stops.load(Ordering::SeqCst), 1);
}
