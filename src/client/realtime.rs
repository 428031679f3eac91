//! Realtime change notifications over the Phoenix channel protocol.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::errors::AppError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;
const PROTOCOL_VERSION: &str = "1.0.0";

/// One Phoenix message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    /// Join the change stream of every row in `public.<resource>`.
    pub fn join(resource: &str, access_token: &str, reference: u64) -> Self {
        Self {
            topic: topic_for(resource),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": "public", "table": resource }
                    ]
                },
                "access_token": access_token
            }),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn leave(resource: &str, reference: u64) -> Self {
        Self {
            topic: topic_for(resource),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }
}

fn topic_for(resource: &str) -> String {
    format!("realtime:public:{}", resource)
}

/// Kind of row change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A row change on a subscribed resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub resource: String,
    pub kind: ChangeKind,
    pub record: Option<Value>,
    pub old_record: Option<Value>,
    pub commit_timestamp: Option<String>,
}

/// Decode a change notification, ignoring replies, heartbeats and system frames.
///
/// Handles both the `postgres_changes` envelope and the older per-kind
/// events (`INSERT`, `UPDATE`, `DELETE`) with the change in the payload.
pub fn decode_change(frame: &Frame, resource: &str) -> Option<ChangeEvent> {
    let data = match frame.event.as_str() {
        "postgres_changes" => frame.payload.get("data")?,
        "INSERT" | "UPDATE" | "DELETE" => &frame.payload,
        _ => return None,
    };

    let kind = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
        .and_then(ChangeKind::from_str)
        .or_else(|| ChangeKind::from_str(&frame.event))?;

    let non_null = |key: &str| data.get(key).filter(|v| !v.is_null()).cloned();

    Some(ChangeEvent {
        resource: data
            .get("table")
            .and_then(Value::as_str)
            .unwrap_or(resource)
            .to_string(),
        kind,
        record: non_null("record").or_else(|| non_null("new")),
        old_record: non_null("old_record").or_else(|| non_null("old")),
        commit_timestamp: data
            .get("commit_timestamp")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Websocket endpoint for a backend base URL.
pub fn websocket_url(base_url: &str, anon_key: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    };
    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn={}",
        ws_base.trim_end_matches('/'),
        anon_key,
        PROTOCOL_VERSION
    )
}

/// Live subscription to one resource's changes.
///
/// Dropping it leaves the channel the same way [`Subscription::unsubscribe`] does.
pub struct Subscription {
    resource: String,
    events: mpsc::Receiver<ChangeEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap an existing event receiver, e.g. from an in-process feed.
    pub fn from_receiver(resource: &str, events: mpsc::Receiver<ChangeEvent>) -> Self {
        Self {
            resource: resource.to_string(),
            events,
            task: None,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Next change, or `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Leave the channel and stop receiving.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Closing the receiver makes the socket task send `phx_leave` and exit.
        self.events.close();
        self.task.take();
    }
}

/// Open a socket, join the resource's channel and stream its changes.
pub async fn connect(url: &str, resource: &str, access_token: &str) -> Result<Subscription, AppError> {
    let (socket, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();

    let join = serde_json::to_string(&Frame::join(resource, access_token, 1))?;
    sink.send(Message::text(join)).await?;
    tracing::debug!(resource, "realtime channel joined");

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let table = resource.to_string();

    let task = tokio::spawn(async move {
        let mut reference: u64 = 1;
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        // Set when the subscriber went away rather than the socket.
        let mut leave = false;
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    reference += 1;
                    let Ok(text) = serde_json::to_string(&Frame::heartbeat(reference)) else {
                        continue;
                    };
                    if let Err(e) = sink.send(Message::text(text)).await {
                        tracing::warn!(resource = %table, "realtime heartbeat failed: {}", e);
                        break;
                    }
                }
                _ = tx.closed() => {
                    leave = true;
                    break;
                }
                message = stream.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let frame: Frame = match serde_json::from_str(text.as_str()) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    tracing::debug!("ignoring unreadable realtime frame: {}", e);
                                    continue;
                                }
                            };
                            if let Some(change) = decode_change(&frame, &table) {
                                if tx.send(change).await.is_err() {
                                    leave = true;
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(resource = %table, "realtime channel closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(resource = %table, "realtime socket error: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        if leave {
            reference += 1;
            if let Ok(text) = serde_json::to_string(&Frame::leave(&table, reference)) {
                if let Err(e) = sink.send(Message::text(text)).await {
                    tracing::debug!(resource = %table, "realtime leave not delivered: {}", e);
                }
            }
            let _ = sink.close().await;
            tracing::debug!(resource = %table, "realtime channel left");
        }
    });

    Ok(Subscription {
        resource: resource.to_string(),
        events: rx,
        task: Some(task),
    })
}
