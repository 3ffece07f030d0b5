use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::types::ClientMessage;
use crate::api::ServerState;
use crate::prompt::PromptRequest;
use crate::stream::{ErrorPayload, StreamEnvelope, StreamSession};

const OUTBOUND_BUFFER: usize = 64;

/// Streams prompts over a WebSocket. Each `prompt` message runs to
/// `stream_end` before the next is accepted; closing the socket cancels the
/// running one. Connection-level events carry the nil request id.
pub async fn handle_ws_prompt(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, state))
}

async fn run_socket(socket: WebSocket, state: ServerState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<StreamEnvelope>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(err) => {
                    log::error!("failed to encode envelope error={err}");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let connection = CancellationToken::new();
    let mut active: Option<JoinHandle<()>> = None;
    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Ping) => send(&tx, StreamEnvelope::pong(Uuid::nil())).await,
            Ok(ClientMessage::Prompt(body)) => {
                if active.as_ref().is_some_and(|task| !task.is_finished()) {
                    reject(&tx, "a prompt is already streaming on this connection").await;
                    continue;
                }
                active = Some(tokio::spawn(stream_prompt(
                    state.clone(),
                    PromptRequest::from(body),
                    tx.clone(),
                    connection.child_token(),
                )));
            }
            Err(err) => reject(&tx, format!("invalid message: {err}")).await,
        }
    }

    log::debug!("websocket closed");
    connection.cancel();
    if let Some(task) = active {
        if let Err(err) = task.await {
            log::error!("stream task failed error={err}");
        }
    }
    drop(tx);
    if let Err(err) = writer.await {
        log::error!("websocket writer failed error={err}");
    }
}

async fn stream_prompt(
    state: ServerState,
    request: PromptRequest,
    sink: mpsc::Sender<StreamEnvelope>,
    cancel: CancellationToken,
) {
    let mut session = StreamSession::new(Uuid::new_v4());
    let result = state
        .coordinator
        .dispatch_streaming(&request, &mut session, sink.clone(), cancel)
        .await;
    match result {
        Ok(outcome) => {
            if let Err(err) = state.aggregator.aggregate_outcome(&request, &outcome) {
                log::error!(
                    "failed to record streamed exchange request_id={} error={err}",
                    outcome.request_id
                );
            }
        }
        Err(err) => {
            log::warn!(
                "stream rejected request_id={} error={err}",
                session.request_id()
            );
            let payload = ErrorPayload {
                model_id: None,
                error: None,
                message: err.to_string(),
            };
            send(&sink, StreamEnvelope::error(session.request_id(), &payload)).await;
        }
    }
}

async fn reject(sink: &mpsc::Sender<StreamEnvelope>, message: impl Into<String>) {
    let payload = ErrorPayload {
        model_id: None,
        error: None,
        message: message.into(),
    };
    send(sink, StreamEnvelope::error(Uuid::nil(), &payload)).await;
}

async fn send(sink: &mpsc::Sender<StreamEnvelope>, envelope: StreamEnvelope) {
    if sink.send(envelope).await.is_err() {
        log::debug!("dropping envelope, client gone");
    }
}
