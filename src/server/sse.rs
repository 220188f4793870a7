//! Legacy SSE transport: announce the session, push the catalog, then keep the
//! stream alive until the client goes away.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::AppState;
use crate::protocol::{
    initialize_result, tools_list_result, JsonRpcResponse, DEFAULT_PROTOCOL_VERSION,
};

type EventStream = ReceiverStream<Result<Event, Infallible>>;

pub async fn handle_sse(State(state): State<Arc<AppState>>) -> Sse<EventStream> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let session = state.sessions.create(DEFAULT_PROTOCOL_VERSION);
    tracing::info!(session = %session.id, "sse stream opened");

    let tools = state.source.list_tools().await;
    let opening = [
        Event::default()
            .event("connected")
            .data(json!({ "session_id": session.id }).to_string()),
        message_event(JsonRpcResponse::result(
            json!(0),
            initialize_result(DEFAULT_PROTOCOL_VERSION),
        )),
        message_event(JsonRpcResponse::result(
            json!(1),
            tools_list_result(&tools),
        )),
    ];

    let keepalive = state.settings.sse_keepalive;
    tokio::spawn(async move {
        for event in opening {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }

        let mut ticker = tokio::time::interval(keepalive);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = ticker.tick() => {
                    if tx.send(Ok(Event::default().comment("keep-alive"))).await.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(session = %session.id, "sse stream closed");
    });

    Sse::new(ReceiverStream::new(rx))
}

fn message_event(response: JsonRpcResponse) -> Event {
    let data = serde_json::to_value(&response)
        .unwrap_or(Value::Null)
        .to_string();
    Event::default().event("message").data(data)
}
