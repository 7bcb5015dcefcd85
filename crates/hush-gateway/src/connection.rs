use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};

use hush_types::api::TokenPayload;
use hush_types::events::{GatewayCommand, GatewayEvent};

use crate::chat::{ChatGateway, ConnectionContext};
use crate::error::GatewayError;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Lifecycle of a gateway connection.
///
/// `Connecting` until the access token presented at upgrade is checked,
/// `Authenticated` once it resolves to a user, `Active` while registered
/// with the dispatcher, `Closed` after it is unregistered. Only `Active`
/// connections receive pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticated)
                | (Connecting, Closed)
                | (Authenticated, Active)
                | (Authenticated, Closed)
                | (Active, Closed)
        )
    }
}

/// Handle a WebSocket whose access token was already resolved at the HTTP
/// upgrade layer. Registers the connection, sends Ready, then runs the event
/// loop until either side goes away.
pub async fn handle_connection(socket: WebSocket, gateway: ChatGateway, user: TokenPayload) {
    let mut state = ConnectionState::Authenticated;
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut user_rx) = gateway.dispatcher().register(user.id).await;
    advance(&mut state, ConnectionState::Active);
    let open = gateway.dispatcher().connection_count(user.id).await;
    info!(
        "{} ({}) connected to gateway [conn {}, {} open]",
        user.nickname, user.id, conn_id, open
    );

    let ctx = ConnectionContext { user, conn_id };

    let ready = GatewayEvent::Ready {
        user_id: ctx.user.id,
    };
    let delivered = match encode(&ready) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => false,
    };

    if delivered {
        run_connection_loop(sender, &mut receiver, &mut user_rx, gateway.clone(), ctx.clone()).await;
    }

    gateway.dispatcher().unregister(ctx.user.id, ctx.conn_id).await;
    advance(&mut state, ConnectionState::Closed);
    info!("{} ({}) disconnected from gateway [conn {}]", ctx.user.nickname, ctx.user.id, ctx.conn_id);
}

async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    user_rx: &mut tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>,
    gateway: ChatGateway,
    ctx: ConnectionContext,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_recv = pong_received.clone();

    let send_loop = async {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = user_rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(msg) = encode(&event) else { continue };
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_received.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    };

    let recv_loop = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        // Each command runs on its own task: once accepted it
                        // completes even if this connection drops mid-flight.
                        let task = {
                            let gateway = gateway.clone();
                            let ctx = ctx.clone();
                            tokio::spawn(async move { gateway.handle_command(&ctx, cmd).await })
                        };
                        if let Err(e) = task.await {
                            warn!("Command task for user {} panicked: {}", ctx.user.id, e);
                        }
                    }
                    Err(e) => {
                        debug!(
                            "{} ({}) bad command: {} -- raw: {}",
                            ctx.user.nickname,
                            ctx.user.id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        gateway.report_error(&ctx, &GatewayError::MalformedCommand).await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    // Whichever side finishes first ends the connection. A command already
    // handed to its own task keeps running after this returns.
    tokio::select! {
        _ = send_loop => {}
        _ = recv_loop => {}
    }
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to serialise gateway event: {}", e);
            None
        }
    }
}

fn advance(state: &mut ConnectionState, next: ConnectionState) {
    debug_assert!(state.can_transition_to(next), "{state:?} -> {next:?}");
    trace!("Connection state {:?} -> {:?}", state, next);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;

    #[test]
    fn lifecycle_only_moves_forward() {
        assert!(Connecting.can_transition_to(Authenticated));
        assert!(Authenticated.can_transition_to(Active));
        assert!(Active.can_transition_to(Closed));
        assert!(Connecting.can_transition_to(Closed));

        assert!(!Connecting.can_transition_to(Active));
        assert!(!Active.can_transition_to(Authenticated));
        assert!(!Closed.can_transition_to(Active));
    }
}
