//! One WebSocket endpoint, multiplexing subscribe/unsubscribe/catchup
//! over any number of channels per connection (spec.md §6):
//!
//! - `{action: "subscribe", channel}` — channel is `"sessions"` or `"session:<id>"`.
//! - `{action: "unsubscribe", channel}`.
//! - `{action: "catchup", channel, last_event_id}` — replay missed events, then live.
//!
//! Outbound delivery is throttled per connection (bounded queue,
//! capacity 64) so one slow WebSocket client can't apply backpressure to
//! the event bus. Per spec.md's supplemented ambient stack, non-terminal
//! events (stage/LLM/MCP activity) are dropped oldest-first when the
//! queue is full; terminal session events (`session.completed`,
//! `session.failed`, `session.cancelled`) are never dropped — a
//! reconnecting client can always miss only in-flight chatter, never the
//! final verdict.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Notify;

use tarsy_domain::model::{Event, EventPayload};
use tarsy_events::SubscriptionId;

use crate::state::AppState;

const OUTBOX_CAPACITY: usize = 64;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientAction {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Catchup { channel: String, last_event_id: i64 },
}

fn is_terminal_event(payload: &EventPayload) -> bool {
    matches!(
        payload,
        EventPayload::SessionCompleted { .. } | EventPayload::SessionFailed { .. } | EventPayload::SessionCancelled { .. }
    )
}

/// Bounded outbound queue shared between the event-bus callback (which
/// pushes) and the writer task (which drains). A plain `mpsc` channel
/// can't selectively evict an already-queued item, so this is a small
/// hand-rolled ring buffer instead.
struct Outbox {
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl Outbox {
    fn new() -> Arc<Self> {
        Arc::new(Self { queue: Mutex::new(VecDeque::with_capacity(OUTBOX_CAPACITY)), notify: Notify::new() })
    }

    fn push(&self, text: String, terminal: bool) {
        let mut q = self.queue.lock();
        if q.len() >= OUTBOX_CAPACITY && !terminal {
            q.pop_front();
        }
        q.push_back(text);
        drop(q);
        self.notify.notify_one();
    }

    fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.queue.lock()).into_iter().collect()
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let outbox = Outbox::new();
    let subscriptions: Arc<Mutex<HashMap<String, SubscriptionId>>> = Arc::new(Mutex::new(HashMap::new()));

    let writer_outbox = outbox.clone();
    let writer = tokio::spawn(async move {
        loop {
            writer_outbox.notify.notified().await;
            for text in writer_outbox.drain() {
                if ws_sink.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => {
                if let Ok(action) = serde_json::from_str::<ClientAction>(&text) {
                    handle_action(&state, &outbox, &subscriptions, action).await;
                } else {
                    tracing::debug!("ignoring unparseable websocket message");
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
            _ => {}
        }
    }

    writer.abort();
    let mut subs = subscriptions.lock();
    for (channel, id) in subs.drain() {
        state.events.unsubscribe(&channel, id);
    }
}

async fn handle_action(
    state: &AppState,
    outbox: &Arc<Outbox>,
    subscriptions: &Arc<Mutex<HashMap<String, SubscriptionId>>>,
    action: ClientAction,
) {
    match action {
        ClientAction::Subscribe { channel } => subscribe(state, outbox, subscriptions, channel),
        ClientAction::Unsubscribe { channel } => {
            if let Some(id) = subscriptions.lock().remove(&channel) {
                state.events.unsubscribe(&channel, id);
            }
        }
        ClientAction::Catchup { channel, last_event_id } => {
            subscribe(state, outbox, subscriptions, channel.clone());
            match state.events.catchup(&channel, last_event_id).await {
                Ok(events) => {
                    for event in events {
                        push_event(outbox, &event);
                    }
                }
                Err(e) => tracing::warn!(channel = %channel, error = %e, "catchup query failed"),
            }
        }
    }
}

fn subscribe(state: &AppState, outbox: &Arc<Outbox>, subscriptions: &Arc<Mutex<HashMap<String, SubscriptionId>>>, channel: String) {
    if subscriptions.lock().contains_key(&channel) {
        return;
    }
    let outbox = outbox.clone();
    let id = state.events.subscribe(
        &channel,
        Arc::new(move |event| push_event(&outbox, &event)),
    );
    subscriptions.lock().insert(channel, id);
}

fn push_event(outbox: &Outbox, event: &Event) {
    let terminal = is_terminal_event(&event.payload);
    match serde_json::to_string(event) {
        Ok(text) => outbox.push(text, terminal),
        Err(e) => tracing::warn!(error = %e, "failed to serialize event for websocket delivery"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events_are_session_completed_failed_cancelled() {
        assert!(is_terminal_event(&EventPayload::SessionCompleted { session_id: "s1".into() }));
        assert!(is_terminal_event(&EventPayload::SessionFailed { session_id: "s1".into(), error_message: "x".into() }));
        assert!(is_terminal_event(&EventPayload::SessionCancelled { session_id: "s1".into() }));
        assert!(!is_terminal_event(&EventPayload::SessionStarted { session_id: "s1".into() }));
        assert!(!is_terminal_event(&EventPayload::StageStarted { session_id: "s1".into(), stage_id: "st1".into() }));
    }

    #[test]
    fn outbox_drops_oldest_non_terminal_when_full() {
        let outbox = Outbox::new();
        for i in 0..OUTBOX_CAPACITY {
            outbox.push(format!("msg-{i}"), false);
        }
        outbox.push("msg-overflow".into(), false);
        let drained = outbox.drain();
        assert_eq!(drained.len(), OUTBOX_CAPACITY);
        assert_eq!(drained.first().unwrap(), "msg-1");
        assert_eq!(drained.last().unwrap(), "msg-overflow");
    }

    #[test]
    fn outbox_never_drops_terminal_messages() {
        let outbox = Outbox::new();
        for i in 0..OUTBOX_CAPACITY {
            outbox.push(format!("msg-{i}"), false);
        }
        outbox.push("terminal".into(), true);
        let drained = outbox.drain();
        assert_eq!(drained.len(), OUTBOX_CAPACITY + 1);
        assert_eq!(drained.last().unwrap(), "terminal");
    }

    #[test]
    fn client_action_parses_subscribe() {
        let action: ClientAction = serde_json::from_str(r#"{"action": "subscribe", "channel": "sessions"}"#).unwrap();
        matches!(action, ClientAction::Subscribe { channel } if channel == "sessions");
    }

    #[test]
    fn client_action_parses_catchup() {
        let action: ClientAction = serde_json::from_str(r#"{"action": "catchup", "channel": "session:abc", "last_event_id": 42}"#).unwrap();
        match action {
            ClientAction::Catchup { channel, last_event_id } => {
                assert_eq!(channel, "session:abc");
                assert_eq!(last_event_id, 42);
            }
            _ => panic!("expected Catchup"),
        }
    }
}
