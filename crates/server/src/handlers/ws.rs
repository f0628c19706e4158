//! WebSocket transport for the relay.
//!
//! Each connection gets three tasks: a reader that parses client frames, a
//! dispatcher that processes them in order through the [`RelayHub`], and a
//! writer that drains the connection's outbound queue.

use crate::core::config::AppState;
use crate::relay::binder::SessionContext;
use crate::relay::events::{ClientEvent, ServerEvent};
use crate::relay::RelayHub;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Response {
    let context = SessionContext::from_request(&headers, query.token);
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, context))
}

async fn handle_socket(socket: WebSocket, hub: Arc<RelayHub>, context: SessionContext) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let Some(session) = hub.connect(&context, out_tx).await else {
        // Only the expired notice is queued; flush it and hang up.
        while let Ok(event) = out_rx.try_recv() {
            let _ = send_event(&mut ws_tx, &event).await;
        }
        let _ = ws_tx.close().await;
        return;
    };

    let (event_tx, event_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let dispatcher = tokio::spawn(hub.clone().dispatch(session.clone(), event_rx));

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            if send_event(&mut ws_tx, &event).await.is_err() {
                break;
            }
        }
    });

    let conn = session.id;
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => {
                        if event_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("{} sent an unrecognised frame: {}", conn, e),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Pending events of a closed connection are dropped, not replayed.
    dispatcher.abort();
    hub.disconnect(&session).await;
}

async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode {:?}: {}", event, e);
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}
