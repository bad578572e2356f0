use crate::helpers::{
    FAKE_SERVER_URL, TEST_AUTH_TOKEN, connect_raw, fake_supervisor, receive_protobuf,
    send_protobuf,
};

use host_core::error::ipc::IpcError;
use host_core::ipc::{IpcClient, start_ipc_server};
use host_core::proto::{
    IpcAuthHandshake, IpcClientMessage, IpcErrorCode, IpcGetServerUrlRequest, IpcServerMessage,
    ipc_client_message, ipc_server_message,
};

use common::RedactedToken;

use std::time::Duration;

fn token() -> RedactedToken {
    RedactedToken::new(TEST_AUTH_TOKEN)
}

/// **VALUE**: Asking before the server is up yields an empty URL, not an error.
///
/// **WHY THIS MATTERS**: UI clients routinely connect while Kolibri is still
/// booting. An error here would make them give up instead of retrying.
#[tokio::test]
async fn given_server_not_started_when_url_requested_then_absent_url() {
    // GIVEN: IPC server in front of a stopped supervisor
    let (_dir, supervisor) = fake_supervisor();
    let handle = start_ipc_server(0, token(), supervisor)
        .await
        .expect("Failed to start IPC server");

    // WHEN: Client asks for the URL
    let mut client = IpcClient::connect(handle.port(), &token())
        .await
        .expect("connect");
    let url = client.get_server_url().await.expect("reply");

    // THEN: Reply arrived with no URL
    assert_eq!(url, None);
    handle.shutdown();
}

#[tokio::test]
async fn given_server_running_when_url_requested_then_url_returned() {
    let (_dir, supervisor) = fake_supervisor();
    supervisor.start().await.expect("start");
    let handle = start_ipc_server(0, token(), supervisor)
        .await
        .expect("Failed to start IPC server");

    let mut client = IpcClient::connect(handle.port(), &token())
        .await
        .expect("connect");

    assert_eq!(
        client.get_server_url().await.expect("reply").as_deref(),
        Some(FAKE_SERVER_URL)
    );
    client.close().await.expect("close");
}

/// **VALUE**: The client-side poll bridges the startup gap.
#[tokio::test]
async fn given_server_starting_later_when_waiting_for_url_then_url_returned() {
    let (_dir, supervisor) = fake_supervisor();
    let handle = start_ipc_server(0, token(), supervisor.clone())
        .await
        .expect("Failed to start IPC server");
    let mut client = IpcClient::connect(handle.port(), &token())
        .await
        .expect("connect");

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        supervisor.start().await.expect("start");
    });

    let url = client
        .wait_for_server_url(Duration::from_secs(10))
        .await
        .expect("url");
    assert_eq!(url, FAKE_SERVER_URL);
}

#[tokio::test]
async fn given_server_never_starts_when_waiting_for_url_then_timeout() {
    let (_dir, supervisor) = fake_supervisor();
    let handle = start_ipc_server(0, token(), supervisor)
        .await
        .expect("Failed to start IPC server");
    let mut client = IpcClient::connect(handle.port(), &token())
        .await
        .expect("connect");

    let err = client
        .wait_for_server_url(Duration::from_millis(200))
        .await
        .expect_err("should time out");

    assert!(matches!(err, IpcError::Timeout { .. }), "got {err}");
}

/// **VALUE**: Wrong tokens are refused.
///
/// **BUG THIS CATCHES**: Token comparison accidentally accepting any value,
/// letting other local users read the server address.
#[tokio::test]
async fn given_wrong_token_when_connecting_then_auth_error() {
    let (_dir, supervisor) = fake_supervisor();
    let handle = start_ipc_server(0, token(), supervisor)
        .await
        .expect("Failed to start IPC server");

    let result = IpcClient::connect(handle.port(), &RedactedToken::new("wrong-token")).await;

    assert!(matches!(result, Err(IpcError::Auth { .. })));
}

#[tokio::test]
async fn given_nothing_listening_when_connecting_then_connect_error() {
    // Bind and drop to find a port that is very likely free.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let result = IpcClient::connect(port, &token()).await;

    assert!(matches!(result, Err(IpcError::Connect { .. })));
}

/// **VALUE**: Replies carry the request id and reply kind they answer.
#[tokio::test]
async fn given_raw_requests_when_sent_then_replies_correlate() {
    let (_dir, supervisor) = fake_supervisor();
    supervisor.start().await.expect("start");
    let handle = start_ipc_server(0, token(), supervisor)
        .await
        .expect("Failed to start IPC server");
    let mut ws = connect_raw(handle.port()).await;

    send_protobuf(
        &mut ws,
        &IpcClientMessage {
            request_id: 1,
            payload: Some(ipc_client_message::Payload::AuthHandshake(
                IpcAuthHandshake {
                    token: TEST_AUTH_TOKEN.to_string(),
                },
            )),
        },
    )
    .await;
    let _auth: IpcServerMessage = receive_protobuf(&mut ws).await;

    for (request_id, reply_kind) in [(41, 7), (42, 9)] {
        send_protobuf(
            &mut ws,
            &IpcClientMessage {
                request_id,
                payload: Some(ipc_client_message::Payload::GetServerUrl(
                    IpcGetServerUrlRequest { reply_kind },
                )),
            },
        )
        .await;
    }

    for (request_id, reply_kind) in [(41, 7), (42, 9)] {
        let reply: IpcServerMessage = receive_protobuf(&mut ws).await;
        assert_eq!(reply.request_id, request_id);
        match reply.payload {
            Some(ipc_server_message::Payload::ServerUrl(url)) => {
                assert_eq!(url.reply_kind, reply_kind);
                assert_eq!(url.server_url.as_deref(), Some(FAKE_SERVER_URL));
            }
            other => panic!("Expected ServerUrl, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn given_authenticated_when_empty_message_sent_then_invalid_message_error() {
    let (_dir, supervisor) = fake_supervisor();
    let handle = start_ipc_server(0, token(), supervisor)
        .await
        .expect("Failed to start IPC server");
    let mut ws = connect_raw(handle.port()).await;

    send_protobuf(
        &mut ws,
        &IpcClientMessage {
            request_id: 1,
            payload: Some(ipc_client_message::Payload::AuthHandshake(
                IpcAuthHandshake {
                    token: TEST_AUTH_TOKEN.to_string(),
                },
            )),
        },
    )
    .await;
    let _auth: IpcServerMessage = receive_protobuf(&mut ws).await;

    send_protobuf(
        &mut ws,
        &IpcClientMessage {
            request_id: 5,
            payload: None,
        },
    )
    .await;

    let reply: IpcServerMessage = receive_protobuf(&mut ws).await;
    assert_eq!(reply.request_id, 5);
    match reply.payload {
        Some(ipc_server_message::Payload::Error(err)) => {
            assert_eq!(err.code(), IpcErrorCode::InvalidMessage);
        }
        other => panic!("Expected Error, got {other:?}"),
    }
}
