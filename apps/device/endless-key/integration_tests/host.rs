use crate::helpers::{Counters, FAKE_SERVER_URL, FakeRuntime, temp_paths};

use endless_key::commands::{serve::Host, url};
use endless_key::error::AppError;
use endless_key::ipc_config::IpcConfig;

use host_core::config::HostConfig;
use host_core::supervisor::LifecycleStatus;

use std::time::Duration;

/// **VALUE**: End-to-end handoff from `serve` to `url` without real Kolibri.
///
/// **WHY THIS MATTERS**: This is the path a UI client takes: read the endpoint
/// file, authenticate, ask for the URL. Every piece must agree on port, token
/// and message shapes.
///
/// **BUG THIS CATCHES**: Advertising the configured port (0) instead of the
/// bound one, or writing a token the server does not accept.
#[tokio::test]
async fn given_running_host_when_url_command_runs_then_server_url_returned() {
    // GIVEN: A host on an ephemeral IPC port with a working server
    let (_dir, paths) = temp_paths();
    let (runtime, counters) = FakeRuntime::new(false);
    let host = Host::start(&paths, &HostConfig::default(), runtime.host_runtime())
        .await
        .expect("host start");

    // WHEN: Asking over IPC the way `endless-key url` does
    let url = url::run(&paths.endpoint_file(), Duration::from_secs(5))
        .await
        .expect("url");

    // THEN: The cached server URL comes back and setup ran once
    assert_eq!(url, FAKE_SERVER_URL);
    assert_eq!(host.ready_url(), Some(FAKE_SERVER_URL));
    assert_eq!(Counters::get(&counters.setups), 1);

    host.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn given_running_host_when_endpoint_read_then_bound_port_advertised() {
    let (_dir, paths) = temp_paths();
    let (runtime, _counters) = FakeRuntime::new(false);
    let host = Host::start(&paths, &HostConfig::default(), runtime.host_runtime())
        .await
        .expect("host start");

    let endpoint = IpcConfig::read(&paths.endpoint_file()).expect("endpoint");

    assert_ne!(endpoint.port(), 0);
    assert_eq!(endpoint.port(), host.ipc_port());

    host.shutdown().await.expect("shutdown");
}

/// **VALUE**: Shutdown leaves nothing running and nothing advertised.
#[tokio::test]
async fn given_running_host_when_shut_down_then_components_stopped_and_endpoint_removed() {
    // GIVEN: A host with the worker enabled
    let (_dir, paths) = temp_paths();
    let (runtime, counters) = FakeRuntime::new(false);
    let host = Host::start(&paths, &HostConfig::default(), runtime.host_runtime())
        .await
        .expect("host start");
    let server = host.server().clone();
    let worker = host.worker().cloned().expect("worker enabled by default");

    // WHEN: Shutting down
    host.shutdown().await.expect("shutdown");

    // THEN: Both stopped once, endpoint file gone
    assert_eq!(server.status().await, LifecycleStatus::Stopped);
    assert_eq!(worker.status().await, LifecycleStatus::Stopped);
    assert_eq!(Counters::get(&counters.worker_starts), 1);
    assert_eq!(Counters::get(&counters.worker_stops), 1);
    assert_eq!(Counters::get(&counters.server_stops), 1);
    assert!(!paths.endpoint_file().exists());
}

#[tokio::test]
async fn given_worker_disabled_when_host_started_then_worker_never_created() {
    let (_dir, paths) = temp_paths();
    let (runtime, counters) = FakeRuntime::new(false);
    let mut config = HostConfig::default();
    config.worker.enabled = false;

    let host = Host::start(&paths, &config, runtime.host_runtime())
        .await
        .expect("host start");

    assert!(host.worker().is_none());
    host.shutdown().await.expect("shutdown");
    assert_eq!(Counters::get(&counters.worker_starts), 0);
}

/// **VALUE**: A server that never comes up does not take the host down.
///
/// **WHY THIS MATTERS**: The UI still needs the IPC endpoint to show a
/// meaningful state; clients tolerate a missing URL and keep polling.
///
/// **BUG THIS CATCHES**: Propagating the readiness failure out of `Host::start`,
/// which would kill the worker and the endpoint with it.
#[tokio::test]
async fn given_failing_server_when_host_started_then_host_continues_without_url() {
    // GIVEN: A server that fails to start
    let (_dir, paths) = temp_paths();
    let (runtime, counters) = FakeRuntime::new(true);
    let mut config = HostConfig::default();
    config.readiness_timeout_ms = 500;

    // WHEN: Starting the host
    let host = Host::start(&paths, &config, runtime.host_runtime())
        .await
        .expect("host start despite server failure");

    // THEN: No URL, worker still started, url command times out
    assert_eq!(host.ready_url(), None);
    assert_eq!(host.server().status().await, LifecycleStatus::Stopped);

    let result = url::run(&paths.endpoint_file(), Duration::from_millis(300)).await;
    assert!(matches!(result, Err(AppError::Core(_))));

    host.shutdown().await.expect("shutdown");
    assert_eq!(Counters::get(&counters.worker_starts), 1);
}

#[tokio::test]
async fn given_no_host_when_url_command_runs_then_app_error() {
    let (_dir, paths) = temp_paths();

    let result = url::run(&paths.endpoint_file(), Duration::from_millis(100)).await;

    assert!(matches!(result, Err(AppError::App { .. })));
}
