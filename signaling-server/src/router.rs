use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use chit_voice_protocol::RoomId;

use crate::voice::{self, ConnectQuery, ServerState};

#[allow(clippy::unused_async)]
async fn health_handler() -> &'static str {
    "OK"
}

#[allow(clippy::unused_async)]
async fn voice_handler(
    State(state): State<ServerState>,
    Path(room_code): Path<String>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| {
        voice::user_connected(socket, RoomId::new(room_code), query, state)
    })
}

/// Body of the match lifecycle notification sent by the game service.
#[derive(Debug, Deserialize)]
pub struct MatchUpdate {
    pub active: bool,
}

async fn match_handler(
    State(state): State<ServerState>,
    Path(room_code): Path<String>,
    Json(update): Json<MatchUpdate>,
) -> StatusCode {
    voice::set_match_active(&state, &RoomId::new(room_code), update.active).await;
    StatusCode::NO_CONTENT
}

pub fn create(server_state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/rooms/:room_code/voice", get(voice_handler))
        .route("/rooms/:room_code/match", put(match_handler))
        .with_state(server_state)
}
