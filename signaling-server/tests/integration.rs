use std::net::TcpListener;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chit_voice_protocol::{ClientEvent, IceCandidate, ServerEvent};
use chit_voice_signaling_server::router;
use chit_voice_signaling_server::voice::ServerState;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let routing = router::create(ServerState::default());
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(routing.into_make_service());
    tokio::spawn(server);

    format!("127.0.0.1:{port}")
}

async fn set_match_active(addr: &str, room: &str, active: bool) {
    let client = hyper::Client::new();
    let request = hyper::Request::builder()
        .method("PUT")
        .uri(format!("http://{addr}/rooms/{room}/match"))
        .header("content-type", "application/json")
        .body(hyper::Body::from(format!("{{\"active\": {active}}}")))
        .unwrap();
    let response = client.request(request).await.unwrap();
    assert_eq!(response.status(), hyper::StatusCode::NO_CONTENT);
}

async fn connect(addr: &str, room: &str, participant: &str) -> Socket {
    let url = format!(
        "ws://{addr}/rooms/{room}/voice?participant_id={participant}&display_name={participant}"
    );
    let (socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("failed to open voice socket");
    socket
}

async fn send(socket: &mut Socket, event: &ClientEvent) {
    let payload = serde_json::to_string(event).unwrap();
    socket.send(Message::Text(payload)).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a server event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("valid server event");
        }
    }
}

async fn wait_for(
    socket: &mut Socket,
    mut pred: impl FnMut(&ServerEvent) -> bool,
) -> ServerEvent {
    loop {
        let event = next_event(socket).await;
        if pred(&event) {
            return event;
        }
    }
}

fn roster_of(event: &ServerEvent) -> Option<Vec<String>> {
    match event {
        ServerEvent::Participants { participants } => {
            let mut ids: Vec<String> = participants
                .iter()
                .map(|p| p.participant_id.as_str().to_owned())
                .collect();
            ids.sort();
            Some(ids)
        }
        _ => None,
    }
}

#[tokio::test]
async fn voice_is_gated_until_a_match_is_active() {
    let addr = start_server().await;
    let mut a = connect(&addr, "gated", "a").await;

    send(&mut a, &ClientEvent::Ready).await;
    match next_event(&mut a).await {
        ServerEvent::Inactive { reason } => assert_eq!(reason, "match_inactive"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn roster_signals_and_status_flow_between_two_clients() {
    let addr = start_server().await;
    set_match_active(&addr, "flow", true).await;

    let mut a = connect(&addr, "flow", "a").await;
    let mut b = connect(&addr, "flow", "b").await;

    send(&mut a, &ClientEvent::Ready).await;
    let roster = wait_for(&mut a, |e| roster_of(e).is_some()).await;
    assert_eq!(roster_of(&roster).unwrap(), ["a"]);

    send(&mut b, &ClientEvent::Ready).await;
    let roster = wait_for(&mut a, |e| roster_of(e) == Some(vec!["a".into(), "b".into()])).await;
    assert!(roster_of(&roster).is_some());
    wait_for(&mut b, |e| roster_of(e) == Some(vec!["a".into(), "b".into()])).await;

    // offer/answer/candidate relay with server-side sender attribution
    send(
        &mut a,
        &ClientEvent::Offer {
            target_participant_id: "b".into(),
            sdp: "offer-sdp".to_owned(),
        },
    )
    .await;
    match wait_for(&mut b, |e| matches!(e, ServerEvent::Offer { .. })).await {
        ServerEvent::Offer {
            from_participant_id,
            sdp,
        } => {
            assert_eq!(from_participant_id.as_str(), "a");
            assert_eq!(sdp, "offer-sdp");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    send(
        &mut b,
        &ClientEvent::Answer {
            target_participant_id: "a".into(),
            sdp: "answer-sdp".to_owned(),
        },
    )
    .await;
    match wait_for(&mut a, |e| matches!(e, ServerEvent::Answer { .. })).await {
        ServerEvent::Answer {
            from_participant_id,
            ..
        } => assert_eq!(from_participant_id.as_str(), "b"),
        other => panic!("unexpected event: {other:?}"),
    }

    send(
        &mut b,
        &ClientEvent::IceCandidate {
            target_participant_id: "a".into(),
            candidate: IceCandidate {
                candidate: "candidate:0 1 UDP 2122252543 192.0.2.1 54400 typ host".to_owned(),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
            },
        },
    )
    .await;
    match wait_for(&mut a, |e| matches!(e, ServerEvent::IceCandidate { .. })).await {
        ServerEvent::IceCandidate {
            from_participant_id,
            candidate,
        } => {
            assert_eq!(from_participant_id.as_str(), "b");
            assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // a flag change is broadcast as a full participant payload
    send(&mut a, &ClientEvent::Mute { is_muted: false }).await;
    match wait_for(&mut b, |e| matches!(e, ServerEvent::Status(_))).await {
        ServerEvent::Status(participant) => {
            assert_eq!(participant.participant_id.as_str(), "a");
            assert!(!participant.is_muted);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // explicit leave shrinks the roster for everyone left
    send(&mut b, &ClientEvent::Leave).await;
    wait_for(&mut a, |e| roster_of(e) == Some(vec!["a".into()])).await;
}

#[tokio::test]
async fn relay_to_an_unknown_target_is_dropped() {
    let addr = start_server().await;
    set_match_active(&addr, "ghost", true).await;
    let mut a = connect(&addr, "ghost", "a").await;

    send(&mut a, &ClientEvent::Ready).await;
    wait_for(&mut a, |e| roster_of(e).is_some()).await;

    send(
        &mut a,
        &ClientEvent::Offer {
            target_participant_id: "nobody".into(),
            sdp: "offer-sdp".to_owned(),
        },
    )
    .await;
    // the server stays alive and the next event a sees is its own status
    send(&mut a, &ClientEvent::Mute { is_muted: false }).await;
    match next_event(&mut a).await {
        ServerEvent::Status(participant) => assert!(!participant.is_muted),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn match_completion_forces_a_voice_shutdown() {
    let addr = start_server().await;
    set_match_active(&addr, "over", true).await;
    let mut a = connect(&addr, "over", "a").await;
    let mut b = connect(&addr, "over", "b").await;

    send(&mut a, &ClientEvent::Ready).await;
    send(&mut b, &ClientEvent::Ready).await;
    wait_for(&mut a, |e| roster_of(e) == Some(vec!["a".into(), "b".into()])).await;

    set_match_active(&addr, "over", false).await;
    match wait_for(&mut a, |e| matches!(e, ServerEvent::Shutdown { .. })).await {
        ServerEvent::Shutdown { reason } => assert_eq!(reason, "match_complete"),
        other => panic!("unexpected event: {other:?}"),
    }
    wait_for(&mut a, |e| roster_of(e) == Some(Vec::new())).await;
    wait_for(&mut b, |e| matches!(e, ServerEvent::Shutdown { .. })).await;
}

#[tokio::test]
async fn dropped_socket_prunes_the_roster() {
    let addr = start_server().await;
    set_match_active(&addr, "gone", true).await;
    let mut a = connect(&addr, "gone", "a").await;
    let mut b = connect(&addr, "gone", "b").await;

    send(&mut a, &ClientEvent::Ready).await;
    send(&mut b, &ClientEvent::Ready).await;
    wait_for(&mut a, |e| roster_of(e) == Some(vec!["a".into(), "b".into()])).await;

    b.close(None).await.unwrap();
    wait_for(&mut a, |e| roster_of(e) == Some(vec!["a".into()])).await;
}
