use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use harmonia_core::realtime::{AuthFrame, ChannelFrame, MSG_CONNECTED, MSG_MISSING_CREDENTIAL};
use harmonia_core::types::OwnerId;
use harmonia_events::{HubMessage, NotificationHub};

use crate::auth::IdentityResolver;
use crate::state::AppState;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// GET /websocket -- upgrade to the realtime channel.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let auth_timeout = Duration::from_secs(state.config.ws_auth_timeout_secs);
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, state.identity, auth_timeout))
}

/// Manage one connection: authenticate, register, forward pushes.
///
/// A client that presents no accepted credential within `auth_timeout`
/// is closed.
/// Inbound frames after registration are ignored. The connection ends when
/// the client closes it, the hub drops it (superseded or shut down), or a
/// send fails.
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<NotificationHub>,
    identity: Arc<dyn IdentityResolver>,
    auth_timeout: Duration,
) {
    let (mut sink, mut stream) = socket.split();

    let authenticated = tokio::time::timeout(
        auth_timeout,
        authenticate(&mut sink, &mut stream, identity.as_ref()),
    )
    .await;
    let owner_id = match authenticated {
        Ok(Some(owner_id)) => owner_id,
        Ok(None) => return,
        Err(_) => {
            tracing::debug!("Realtime client sent no credential in time");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let (conn_id, mut rx) = hub.register(owner_id).await;
    tracing::info!(owner_id, conn_id = %conn_id, "Realtime client connected");

    if sink.send(frame(&ChannelFrame::success(MSG_CONNECTED))).await.is_err() {
        hub.release(owner_id, conn_id).await;
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let out = match msg {
                HubMessage::Frame(f) => frame(&f),
                HubMessage::Ping => Message::Ping(Bytes::new()),
                HubMessage::Close => break,
            };
            if sink.send(out).await.is_err() {
                return;
            }
        }
        // Superseded, closed by the hub, or shutting down.
        let _ = sink.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(owner_id, error = %e, "Realtime receive error");
                    break;
                }
            },
        }
    }

    send_task.abort();
    hub.release(owner_id, conn_id).await;
    tracing::info!(owner_id, conn_id = %conn_id, "Realtime client disconnected");
}

/// Wait for a frame carrying a credential and resolve it.
///
/// A frame without a credential gets a "missing" reply and the wait goes
/// on; a rejected credential gets the error reply and ends the connection.
async fn authenticate(
    sink: &mut WsSink,
    stream: &mut WsStream,
    identity: &dyn IdentityResolver,
) -> Option<OwnerId> {
    while let Some(inbound) = stream.next().await {
        let text = match inbound {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };

        let token = serde_json::from_str::<AuthFrame>(text.as_str())
            .ok()
            .and_then(|f| f.access_token)
            .filter(|t| !t.trim().is_empty());
        let Some(token) = token else {
            let reply = frame(&ChannelFrame::fail(MSG_MISSING_CREDENTIAL));
            if sink.send(reply).await.is_err() {
                return None;
            }
            continue;
        };

        match identity.resolve(token.trim()).await {
            Ok(owner_id) => return Some(owner_id),
            Err(e) => {
                tracing::debug!(error = %e, "Realtime credential rejected");
                let _ = sink.send(frame(&ChannelFrame::fail(e.to_string()))).await;
                let _ = sink.send(Message::Close(None)).await;
                return None;
            }
        }
    }
    None
}

fn frame(f: &ChannelFrame) -> Message {
    Message::Text(f.to_json().into())
}
