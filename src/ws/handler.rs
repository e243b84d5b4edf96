//! WebSocket upgrade handler and per-connection socket task

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{ServerEvent, ServerHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, PlayerId, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Client-generated session token, one live connection per token
    pub token: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.token, state))
}

/// Handle the upgraded WebSocket connection: register with the session
/// actor, pump frames both ways, deregister on the way out.
async fn handle_socket(socket: WebSocket, token: String, state: AppState) {
    let (mut ws_sink, ws_stream) = socket.split();

    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = oneshot::channel();
    if state
        .server
        .events
        .send(ServerEvent::Connect {
            token,
            sender: msg_tx,
            reply: reply_tx,
        })
        .is_err()
    {
        error!("Session actor is gone, dropping connection");
        return;
    }

    let player_id = match reply_rx.await {
        Ok(Ok(id)) => id,
        Ok(Err(e)) => {
            // The client gets one fatal frame explaining the refusal
            // before the socket closes
            let _ = send_msg(
                &mut ws_sink,
                &ServerMsg::Error {
                    message: e.to_string(),
                    fatal: true,
                },
            )
            .await;
            let _ = ws_sink.close().await;
            return;
        }
        Err(_) => return,
    };

    info!(player_id = %player_id, "New WebSocket connection");

    run_session(
        player_id,
        ws_sink,
        ws_stream,
        msg_rx,
        &state.server,
        state.config.heartbeat_interval_ms,
    )
    .await;

    let _ = state
        .server
        .events
        .send(ServerEvent::Disconnect { player_id });

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Single select loop per connection: outbound frames from the actor,
/// inbound frames from the client, and a periodic keep-alive ping.
async fn run_session(
    player_id: PlayerId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut msg_rx: mpsc::UnboundedReceiver<ServerMsg>,
    server: &ServerHandle,
    keep_alive_ms: u64,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let mut keep_alive = interval(Duration::from_millis(keep_alive_ms.max(1)));
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            outbound = msg_rx.recv() => match outbound {
                Some(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                // The actor unregistered us (e.g. heartbeat timeout)
                None => break,
            },

            _ = keep_alive.tick() => {
                if ws_sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            inbound = ws_stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !rate_limiter.check_message() {
                        warn!(player_id = %player_id, "Rate limited inbound message");
                        continue;
                    }
                    match serde_json::from_str::<ClientMsg>(&text) {
                        Ok(msg) => {
                            if server
                                .events
                                .send(ServerEvent::Message { player_id, msg })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        }
                    }
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Transport liveness counts as activity for the sweep
                    let _ = server.events.send(ServerEvent::Activity { player_id });
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(player_id = %player_id, "Received binary message, ignoring");
                }
                Some(Ok(Message::Close(_))) => {
                    info!(player_id = %player_id, "Client initiated close");
                    break;
                }
                Some(Err(e)) => {
                    error!(player_id = %player_id, error = %e, "WebSocket error");
                    break;
                }
                None => break,
            },
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
