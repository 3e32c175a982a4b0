use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Streams the home view-model: the current view on connect, then every
/// change the progression controller publishes.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| stream_views(socket, state))
}

async fn stream_views(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut incoming) = socket.split();
    let mut views = WatchStream::new(state.home.subscribe_view());

    info!("view stream client connected");

    loop {
        tokio::select! {
            view = views.next() => {
                let Some(view) = view else { break };
                let payload = match serde_json::to_string(&view) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "home view not serializable");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            message = incoming.next() => {
                match message {
                    // inbound frames are ignored; the stream is one-way
                    Some(Ok(frame)) => debug!(?frame, "ignoring inbound ws frame"),
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    info!("view stream client disconnected");
}
