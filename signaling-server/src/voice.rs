use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, TryFutureExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use chit_voice_protocol::{ClientEvent, Participant, ParticipantId, RoomId, ServerEvent};

/// One socket, one id; a participant may hold several sockets at once
/// (page reloads race their predecessor's close).
pub type SocketId = Uuid;

/// Sender half of one participant socket plus its room binding.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub room: RoomId,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub tx: mpsc::UnboundedSender<Message>,
}

/// A registered voice participant and the sockets backing it.
/// The entry dies with its last socket.
#[derive(Debug)]
pub struct ParticipantEntry {
    pub participant: Participant,
    pub sids: HashSet<SocketId>,
}

/// Per-room voice state.
#[derive(Debug, Default)]
pub struct VoiceRoom {
    pub participants: HashMap<ParticipantId, ParticipantEntry>,
    pub match_active: bool,
}

pub type Connections = Arc<RwLock<HashMap<SocketId, ConnectionHandle>>>;
pub type Rooms = Arc<RwLock<HashMap<RoomId, VoiceRoom>>>;

/// Shared state handed to every handler.
#[derive(Debug, Clone, Default)]
pub struct ServerState {
    pub connections: Connections,
    pub rooms: Rooms,
}

/// Identity the client provides when opening its voice socket.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub participant_id: String,
    pub display_name: String,
}

pub async fn user_connected(
    socket: WebSocket,
    room: RoomId,
    query: ConnectQuery,
    state: ServerState,
) {
    let sid = Uuid::new_v4();
    let participant_id = ParticipantId::new(query.participant_id);
    info!("voice socket open: room={room} participant={participant_id} sid={sid}");

    let (mut user_ws_tx, mut user_ws_rx) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel();
    let mut rx = UnboundedReceiverStream::new(rx);

    tokio::task::spawn(async move {
        while let Some(message) = rx.next().await {
            user_ws_tx
                .send(message)
                .unwrap_or_else(|e| error!("websocket send error: {e}"))
                .await;
        }
    });

    state.connections.write().await.insert(
        sid,
        ConnectionHandle {
            room,
            participant_id: participant_id.clone(),
            display_name: query.display_name,
            tx,
        },
    );

    while let Some(result) = user_ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                error!("websocket error (sid={sid}): {e}");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => {
                if let Err(err) = handle_client_event(sid, event, &state).await {
                    error!("error while handling voice event: {err}");
                }
            }
            Err(err) => warn!("undecodable voice event from {participant_id}: {err}"),
        }
    }

    info!("voice socket closed: sid={sid}");
    user_disconnected(sid, &state).await;
}

async fn handle_client_event(
    sid: SocketId,
    event: ClientEvent,
    state: &ServerState,
) -> anyhow::Result<()> {
    let handle = state
        .connections
        .read()
        .await
        .get(&sid)
        .cloned()
        .context("event from unregistered socket")?;

    match event {
        ClientEvent::Ready => ready(sid, &handle, state).await,
        ClientEvent::Offer {
            target_participant_id,
            sdp,
        } => {
            let event = ServerEvent::Offer {
                from_participant_id: handle.participant_id.clone(),
                sdp,
            };
            relay(&handle, state, &target_participant_id, &event).await
        }
        ClientEvent::Answer {
            target_participant_id,
            sdp,
        } => {
            let event = ServerEvent::Answer {
                from_participant_id: handle.participant_id.clone(),
                sdp,
            };
            relay(&handle, state, &target_participant_id, &event).await
        }
        ClientEvent::IceCandidate {
            target_participant_id,
            candidate,
        } => {
            let event = ServerEvent::IceCandidate {
                from_participant_id: handle.participant_id.clone(),
                candidate,
            };
            relay(&handle, state, &target_participant_id, &event).await
        }
        ClientEvent::Mute { is_muted } => {
            update_status(&handle, state, |p| p.is_muted = is_muted).await
        }
        ClientEvent::AutoMute { is_muted } => {
            update_status(&handle, state, |p| p.is_auto_muted = is_muted).await
        }
        ClientEvent::PushToTalk { is_pressed } => {
            update_status(&handle, state, |p| p.push_to_talk_pressed = is_pressed).await
        }
        ClientEvent::Leave => leave(sid, &handle, state).await,
    }
}

/// Register the caller in the room's voice roster, or tell it voice is
/// gated until a match runs. A re-registering participant keeps its
/// flags and refreshes its display name.
async fn ready(
    sid: SocketId,
    handle: &ConnectionHandle,
    state: &ServerState,
) -> anyhow::Result<()> {
    let snapshot = {
        let mut rooms = state.rooms.write().await;
        let room = rooms.entry(handle.room.clone()).or_default();
        if room.match_active {
            let entry = room
                .participants
                .entry(handle.participant_id.clone())
                .or_insert_with(|| ParticipantEntry {
                    participant: Participant::new(
                        handle.participant_id.clone(),
                        handle.display_name.clone(),
                    ),
                    sids: HashSet::new(),
                });
            entry.participant.display_name = handle.display_name.clone();
            entry.sids.insert(sid);
            Some(roster_snapshot(room))
        } else {
            None
        }
    };
    match snapshot {
        Some(snapshot) => broadcast(state, &handle.room, &snapshot).await,
        None => send_to(
            &handle.tx,
            &ServerEvent::Inactive {
                reason: "match_inactive".to_owned(),
            },
        ),
    }
}

/// Pass a signal to every socket of the target participant. Unknown
/// targets are dropped: the peer may have just left.
async fn relay(
    handle: &ConnectionHandle,
    state: &ServerState,
    target: &ParticipantId,
    event: &ServerEvent,
) -> anyhow::Result<()> {
    let target_sids: Vec<SocketId> = {
        let rooms = state.rooms.read().await;
        rooms
            .get(&handle.room)
            .and_then(|room| room.participants.get(target))
            .map(|entry| entry.sids.iter().copied().collect())
            .unwrap_or_default()
    };
    if target_sids.is_empty() {
        debug!("no live sockets for relay target {target}");
        return Ok(());
    }
    let payload = serde_json::to_string(event)?;
    let connections = state.connections.read().await;
    for sid in target_sids {
        if let Some(connection) = connections.get(&sid) {
            let _ = connection.tx.send(Message::Text(payload.clone()));
        }
    }
    Ok(())
}

/// Patch one flag of the caller's roster entry and broadcast the whole
/// updated participant as `voice:status`.
async fn update_status(
    handle: &ConnectionHandle,
    state: &ServerState,
    patch: impl FnOnce(&mut Participant),
) -> anyhow::Result<()> {
    let updated = {
        let mut rooms = state.rooms.write().await;
        rooms
            .get_mut(&handle.room)
            .and_then(|room| room.participants.get_mut(&handle.participant_id))
            .map(|entry| {
                patch(&mut entry.participant);
                entry.participant.clone()
            })
    };
    match updated {
        Some(participant) => {
            broadcast(state, &handle.room, &ServerEvent::Status(participant)).await
        }
        None => {
            debug!(
                "flag update from unregistered participant {}",
                handle.participant_id
            );
            Ok(())
        }
    }
}

async fn leave(sid: SocketId, handle: &ConnectionHandle, state: &ServerState) -> anyhow::Result<()> {
    match unregister_sid(sid, handle, state).await {
        Some(snapshot) => broadcast(state, &handle.room, &snapshot).await,
        None => Ok(()),
    }
}

/// Drop one socket of a participant; when it was the last one, remove
/// the participant and return the roster snapshot to broadcast.
async fn unregister_sid(
    sid: SocketId,
    handle: &ConnectionHandle,
    state: &ServerState,
) -> Option<ServerEvent> {
    let mut rooms = state.rooms.write().await;
    let room = rooms.get_mut(&handle.room)?;
    let entry = room.participants.get_mut(&handle.participant_id)?;
    entry.sids.remove(&sid);
    if !entry.sids.is_empty() {
        return None;
    }
    room.participants.remove(&handle.participant_id);
    let snapshot = roster_snapshot(room);
    let room_dead = room.participants.is_empty() && !room.match_active;
    if room_dead {
        rooms.remove(&handle.room);
    }
    Some(snapshot)
}

async fn user_disconnected(sid: SocketId, state: &ServerState) {
    let Some(handle) = state.connections.write().await.remove(&sid) else {
        return;
    };
    if let Some(snapshot) = unregister_sid(sid, &handle, state).await {
        if let Err(err) = broadcast(state, &handle.room, &snapshot).await {
            error!("failed to broadcast roster after disconnect: {err}");
        }
    }
}

/// Flip the room's match gate. Going inactive with live participants
/// performs the forced shutdown: `voice:shutdown` followed by an empty
/// roster snapshot, then the room forgets its participants.
pub async fn set_match_active(state: &ServerState, room_id: &RoomId, active: bool) {
    let shutdown = {
        let mut rooms = state.rooms.write().await;
        let room = rooms.entry(room_id.clone()).or_default();
        room.match_active = active;
        if !active && !room.participants.is_empty() {
            room.participants.clear();
            true
        } else {
            false
        }
    };
    if shutdown {
        info!("match over in room {room_id}, voice shut down");
        let shutdown_event = ServerEvent::Shutdown {
            reason: "match_complete".to_owned(),
        };
        if let Err(err) = broadcast(state, room_id, &shutdown_event).await {
            error!("failed to broadcast voice shutdown: {err}");
        }
        let empty_roster = ServerEvent::Participants {
            participants: Vec::new(),
        };
        if let Err(err) = broadcast(state, room_id, &empty_roster).await {
            error!("failed to broadcast empty roster: {err}");
        }
    }
}

async fn broadcast(
    state: &ServerState,
    room: &RoomId,
    event: &ServerEvent,
) -> anyhow::Result<()> {
    let payload = serde_json::to_string(event)?;
    let connections = state.connections.read().await;
    for handle in connections.values().filter(|handle| &handle.room == room) {
        let _ = handle.tx.send(Message::Text(payload.clone()));
    }
    Ok(())
}

fn send_to(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) -> anyhow::Result<()> {
    let payload = serde_json::to_string(event)?;
    tx.send(Message::Text(payload))
        .map_err(|_| anyhow!("socket writer task is gone"))
}

fn roster_snapshot(room: &VoiceRoom) -> ServerEvent {
    ServerEvent::Participants {
        participants: room
            .participants
            .values()
            .map(|entry| entry.participant.clone())
            .collect(),
    }
}
