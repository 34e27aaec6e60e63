//! Channel transport over `WebSocket`.
//!
//! Each inbound frame `{ id, event, params }` is dispatched as its own task;
//! the reply `{ id, ok, data | error }` goes back on the same connection in
//! the frame's encoding (JSON text or `MsgPack` binary).

use std::sync::Arc;

use actionhub_core::{
    decode_request, encode_reply, ChannelReply, ErrorBody, FrameEncoding, InvocationError,
    Transport,
};
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::{caller_from_headers, AppState};
use crate::network::connection::{ConnectionHandle, OutboundMessage};
use crate::service::Invocation;

/// Upgrades to a channel connection in the default socket namespace.
pub async fn ws_upgrade_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, None, &headers, ws)
}

/// Upgrades to a channel connection in an explicit socket namespace.
pub async fn ws_namespace_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, Some(namespace), &headers, ws)
}

fn upgrade(
    state: AppState,
    socket_namespace: Option<String>,
    headers: &HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let caller = caller_from_headers(headers);
    ws.on_upgrade(move |socket| async move {
        let (handle, rx) =
            state
                .connections
                .register(caller, socket_namespace, &state.config.connection);
        run_connection(state, socket, handle, rx).await;
    })
}

async fn run_connection(
    state: AppState,
    socket: WebSocket,
    handle: Arc<ConnectionHandle>,
    mut rx: tokio::sync::mpsc::Receiver<OutboundMessage>,
) {
    let (mut sink, mut stream) = socket.split();
    debug!(
        connection = handle.id.0,
        namespace = handle.socket_namespace.as_deref().unwrap_or("/"),
        "channel connection opened"
    );

    // Write loop: drains the outbound channel until every sender is gone or
    // a close frame has been written.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let (frame, closing) = match msg {
                OutboundMessage::Text(text) => (Message::Text(text.into()), false),
                OutboundMessage::Binary(bytes) => (Message::Binary(bytes.into()), false),
                OutboundMessage::Close(reason) => (
                    Message::Close(reason.map(|reason| CloseFrame {
                        code: close_code::AWAY,
                        reason: reason.into(),
                    })),
                    true,
                ),
            };
            if sink.send(frame).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let (bytes, encoding) = match msg {
            Message::Text(text) => (
                Bytes::copy_from_slice(text.as_str().as_bytes()),
                FrameEncoding::Json,
            ),
            Message::Binary(bytes) => (bytes, FrameEncoding::MsgPack),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        tokio::spawn(handle_frame(state.clone(), Arc::clone(&handle), bytes, encoding));
    }

    state.connections.remove(handle.id);
    debug!(connection = handle.id.0, "channel connection closed");
}

/// Decodes, dispatches and answers one frame.
async fn handle_frame(
    state: AppState,
    handle: Arc<ConnectionHandle>,
    bytes: Bytes,
    encoding: FrameEncoding,
) {
    let request = match decode_request(&bytes, encoding) {
        Ok(request) => request,
        Err(err) => {
            warn!(connection = handle.id.0, error = %err, "malformed channel frame");
            let reply = ChannelReply {
                id: 0,
                ok: false,
                data: None,
                error: Some(ErrorBody {
                    name: "BadRequest".to_string(),
                    message: format!("malformed frame: {err}"),
                    code: 400,
                    data: None,
                }),
            };
            send_reply(&state, &handle, &reply, encoding).await;
            return;
        }
    };

    let action = state
        .routes
        .channel_action(handle.socket_namespace.as_deref(), &request.event);
    let result = match action {
        Some(action) => {
            let invocation =
                Invocation::new(action, request.params, handle.caller.clone(), Transport::Channel);
            state.dispatcher.dispatch(invocation).await
        }
        None => Err(InvocationError::UnknownAction {
            name: request.event.clone(),
        }),
    };

    let reply = match result {
        Ok(data) => ChannelReply::success(request.id, data),
        Err(err) => ChannelReply::failure(request.id, &err),
    };
    send_reply(&state, &handle, &reply, encoding).await;
}

async fn send_reply(
    state: &AppState,
    handle: &ConnectionHandle,
    reply: &ChannelReply,
    encoding: FrameEncoding,
) {
    let encoded = encode_reply(reply, encoding).and_then(|bytes| match encoding {
        FrameEncoding::Json => Ok(OutboundMessage::Text(String::from_utf8(bytes)?)),
        FrameEncoding::MsgPack => Ok(OutboundMessage::Binary(bytes)),
    });
    let msg = match encoded {
        Ok(msg) => msg,
        Err(err) => {
            warn!(connection = handle.id.0, error = %err, "failed to encode channel reply");
            return;
        }
    };

    if let Err(err) = handle
        .send_timeout(msg, state.config.connection.send_timeout)
        .await
    {
        warn!(connection = handle.id.0, reply = reply.id, error = %err, "channel reply dropped");
    }
}
