// WebSocket handlers for bot and spectator connections.
//
// Each socket gets a session in the connection registry and a bounded
// outbound queue. The loop below forwards queued messages to the socket and
// dispatches inbound frames to the controller; it never blocks a match.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use std::net::SocketAddr;

use crate::controller::PostAction;
use crate::error::ArenaError;
use crate::protocol::{ServerMessage, CLOSE_RATE_LIMITED};
use crate::rate_limit::RateLimitType;
use crate::registry::SessionKind;

use super::AppState;

/// Upgrade handler for the bot-facing route.
pub async fn ws_bot(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, addr, SessionKind::Bot))
}

/// Upgrade handler for the spectator route.
pub async fn ws_spectate(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, addr, SessionKind::Spectator))
}

async fn handle_ws(mut socket: WebSocket, state: AppState, addr: SocketAddr, kind: SessionKind) {
    let peer = addr.ip().to_string();

    // Per-peer connection rate limit; breaches close with a specific code.
    if state
        .rate_limiter
        .check_limit(&peer, RateLimitType::Connection)
        .is_err()
    {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_RATE_LIMITED,
                reason: "rate limited".into(),
            })))
            .await;
        return;
    }

    let (conn, mut outbound) = state.registry.add(kind, &peer);
    state.registry.send(
        conn,
        &ServerMessage::Welcome {
            requires_auth: kind == SessionKind::Bot,
        },
    );

    let mut close_code: Option<u16> = None;
    loop {
        tokio::select! {
            queued = outbound.recv() => {
                match queued {
                    Some(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // Sender dropped: evicted by a newer session or swept as stale.
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        state.registry.touch(conn);
                        if let Err(e) = state
                            .rate_limiter
                            .check_limit(&peer, RateLimitType::Message)
                        {
                            state.registry.send(
                                conn,
                                &ServerMessage::error(&ArenaError::RateLimited(e.to_string())),
                            );
                            continue;
                        }
                        match state.controller.handle_text(conn, &text) {
                            PostAction::Continue => {}
                            PostAction::Close(code) => {
                                close_code = Some(code);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ping/pong/binary frames are ignored.
                        state.registry.touch(conn);
                    }
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Flush anything already queued (e.g. the ERROR preceding a close),
    // then close with the specific code if one was set.
    while let Ok(json) = outbound.try_recv() {
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
    if let Some(code) = close_code {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "".into(),
            })))
            .await;
    }

    state.registry.remove(conn);
}
