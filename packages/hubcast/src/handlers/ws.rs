use axum::{
    Json,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use hub_engine::{Frame, FrameSink, FrameSource, OpCode, TransportError, run_session};
use tracing::{debug, warn};

use crate::AppState;

/// Longest room id accepted in `/ws/{room}`, in characters
pub const MAX_ROOM_ID_CHARS: usize = 128;

/// Upgrade to a websocket and join the room named in the path.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(room): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(reason) = validate_room_id(&room) {
        state.metrics.invalid_room_id();
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": reason })),
        )
            .into_response();
    }

    // Refuse oversized frames in the protocol layer, before they are buffered
    let limit = state.connection_config.max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| serve_socket(socket, room, state))
}

async fn serve_socket(socket: WebSocket, room: String, state: AppState) {
    let (sink, stream) = socket.split();
    state.metrics.session_opened();

    match run_session(
        &state.registry,
        &room,
        WsSource { stream },
        WsSink { sink },
        &state.connection_config,
    )
    .await
    {
        Ok(conn) => debug!(hub = %room, conn = %conn, "WebSocket session closed"),
        Err(e) => {
            state.metrics.session_rejected();
            warn!(hub = %room, "WebSocket session could not join: {}", e);
        }
    }

    state.metrics.session_closed();
}

/// Room ids are 1..=128 characters with no control characters.
pub fn validate_room_id(room: &str) -> Result<(), &'static str> {
    if room.is_empty() {
        return Err("room id must not be empty");
    }
    if room.chars().count() > MAX_ROOM_ID_CHARS {
        return Err("room id is longer than 128 characters");
    }
    if room.chars().any(char::is_control) {
        return Err("room id contains control characters");
    }
    Ok(())
}

/// Read half of an axum websocket
pub struct WsSource {
    stream: SplitStream<WebSocket>,
}

impl FrameSource for WsSource {
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        match self.stream.next().await {
            Some(Ok(message)) => Ok(frame_from_message(message)),
            Some(Err(e)) => Err(TransportError::Io(e.to_string())),
            None => Err(TransportError::Closed),
        }
    }
}

/// Write half of an axum websocket
pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

impl FrameSink for WsSink {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.sink
            .send(message_from_frame(frame))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

fn frame_from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::text(Bytes::copy_from_slice(text.as_str().as_bytes())),
        Message::Binary(data) => Frame::new(OpCode::Binary, data),
        Message::Ping(data) => Frame::new(OpCode::Ping, data),
        Message::Pong(data) => Frame::new(OpCode::Pong, data),
        Message::Close(_) => Frame::close(),
    }
}

fn message_from_frame(frame: Frame) -> Message {
    match frame.op {
        OpCode::Text => Message::Text(String::from_utf8_lossy(&frame.payload).into_owned().into()),
        OpCode::Binary => Message::Binary(frame.payload),
        OpCode::Ping => Message::Ping(frame.payload),
        OpCode::Pong => Message::Pong(frame.payload),
        OpCode::Close => Message::Close(None),
    }
}
