use crate::scheduler::handle::SchedulerHandle;
use crate::scheduler::scheduler::Command;
use crate::scheduler::status::SchedulerState;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

/// Breathing room after a failed accept (e.g. out of file descriptors).
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Requests a presenter (menu bar, status bar widget, script) can send.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    TriggerNow,
    Pause {
        #[serde(default)]
        secs: Option<u64>,
    },
    Resume,
    Status,
}

/// Sent in reply to every request and pushed after every state change.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebSocketResponse {
    pub success: bool,
    pub message: Option<String>,
    pub status: String,
    pub paused: bool,
}

impl WebSocketResponse {
    fn current(scheduler: &SchedulerHandle, success: bool, message: Option<String>) -> Self {
        Self::of(scheduler, &scheduler.state(), success, message)
    }

    fn of(
        scheduler: &SchedulerHandle,
        state: &SchedulerState,
        success: bool,
        message: Option<String>,
    ) -> Self {
        Self {
            success,
            message,
            status: scheduler.describe(state),
            paused: state.is_paused,
        }
    }
}

pub async fn start_websocket_server(
    addr: SocketAddr,
    scheduler: SchedulerHandle,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("control server listening on ws://{}", listener.local_addr()?);
    serve(listener, scheduler).await;
    Ok(())
}

pub async fn serve(listener: TcpListener, scheduler: SchedulerHandle) {
    let listener = Arc::new(listener);
    accept_loop(
        move || {
            let listener = listener.clone();
            async move { listener.accept().await }
        },
        scheduler,
    )
    .await
}

/// Accept connections forever. A failed accept is logged and retried.
async fn accept_loop<F, Fut>(mut accept: F, scheduler: SchedulerHandle)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<(TcpStream, SocketAddr)>>,
{
    loop {
        match accept().await {
            Ok((stream, peer_addr)) => {
                debug!("new control connection from {}", peer_addr);
                tokio::spawn(handle_connection(stream, peer_addr, scheduler.clone()));
            }
            Err(e) => {
                warn!("failed to accept control connection: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Answer one request. Commands are applied before replying, so the reply
/// carries the state they produced.
pub async fn handle_request(text: &str, scheduler: &SchedulerHandle) -> WebSocketResponse {
    let request = match serde_json::from_str::<ControlMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            warn!("failed to parse control message: {}", e);
            return WebSocketResponse::current(
                scheduler,
                false,
                Some(format!("Parse error: {}", e)),
            );
        }
    };
    debug!(?request, "control request");

    let (command, message) = match request {
        ControlMessage::TriggerNow => (Command::TriggerNow, "Break requested"),
        ControlMessage::Pause { secs: None } => {
            (Command::Pause(scheduler.default_pause()), "Paused")
        }
        ControlMessage::Pause { secs: Some(0) } => {
            return WebSocketResponse::current(
                scheduler,
                false,
                Some("Pause length must be greater than zero".to_string()),
            );
        }
        ControlMessage::Pause { secs: Some(secs) } => {
            (Command::Pause(Duration::from_secs(secs)), "Paused")
        }
        ControlMessage::Resume => (Command::Resume, "Resumed"),
        ControlMessage::Status => {
            return WebSocketResponse::current(scheduler, true, Some("Status".to_string()));
        }
    };

    match scheduler.apply(command).await {
        Ok(state) => WebSocketResponse::of(scheduler, &state, true, Some(message.to_string())),
        Err(e) => WebSocketResponse::current(scheduler, false, Some(e.to_string())),
    }
}

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, scheduler: SchedulerHandle) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed with {}: {}", peer_addr, e);
            return;
        }
    };

    debug!("WebSocket handshake completed with {}", peer_addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut status = scheduler.subscribe();
    status.borrow_and_update();

    loop {
        let reply = tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_request(&text, &scheduler).await,
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                        break;
                    }
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("control connection closed by {}", peer_addr);
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("WebSocket error from {}: {}", peer_addr, e);
                    break;
                }
            },
            changed = status.changed() => {
                if changed.is_err() {
                    // Scheduler is gone; nothing more to report.
                    break;
                }
                WebSocketResponse::current(&scheduler, true, None)
            }
        };

        match serde_json::to_string(&reply) {
            Ok(json) => {
                if let Err(e) = ws_sender.send(Message::Text(json)).await {
                    warn!("Failed to send WebSocket response: {}", e);
                    break;
                }
            }
            Err(e) => warn!("Failed to serialize response: {}", e),
        }
    }

    debug!("control connection with {} terminated", peer_addr);
}
