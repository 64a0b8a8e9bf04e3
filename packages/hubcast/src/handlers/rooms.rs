use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use hub_engine::RoomSummary;
use tracing::info;

use crate::AppState;

/// List live rooms, sorted by id
pub async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.rooms().await)
}

pub async fn get_room(State(state): State<AppState>, Path(room): Path<String>) -> Response {
    match state.registry.get(&room).await {
        Some(hub) => Json(RoomSummary {
            id: hub.id().to_string(),
            members: hub.member_count().await,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "room not found" })),
        )
            .into_response(),
    }
}

/// Send the request body to every room.
///
/// Waits for space on each room's broadcast queue, so a saturated room
/// delays the response.
pub async fn broadcast_handler(State(state): State<AppState>, body: String) -> Response {
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "empty message" })),
        )
            .into_response();
    }

    state.metrics.admin_broadcast();
    let rooms = state.registry.broadcast_all(Bytes::from(body)).await;
    info!(rooms, "Server-wide broadcast posted");

    Json(serde_json::json!({ "rooms": rooms })).into_response()
}
