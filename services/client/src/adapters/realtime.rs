//! services/client/src/adapters/realtime.rs
//!
//! The realtime adapter: the concrete implementation of the `RealtimeService`
//! port over the backend's Phoenix-channel websocket.
//!
//! Every subscription owns one socket and one channel. Subscribing connects,
//! joins the channel with a `postgres_changes` filter, and waits for the join
//! reply. A background task then forwards matching row changes, sends the
//! heartbeat, and on cancellation leaves the channel and closes the socket.

use async_trait::async_trait;
use futures::{stream, Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use campus_swap_core::domain::Message;
use campus_swap_core::ports::{
    ChangeKind, PortError, PortResult, RealtimeService, Subscription, TradeChange,
};

use super::http::BackendHttp;
use super::rest::MessageRecord;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const CHANNEL_BUFFER: usize = 64;

//=========================================================================================
// Wire Frames
//=========================================================================================

/// One Phoenix message, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Frame {
    topic: String,
    event: String,
    payload: Value,
    #[serde(rename = "ref")]
    reference: Option<String>,
    #[serde(default)]
    join_ref: Option<String>,
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
            join_ref: None,
        }
    }

    fn to_text(&self) -> PortResult<String> {
        serde_json::to_string(self).map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

/// The `data` of a `postgres_changes` push.
#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    old_record: Value,
}

#[derive(Debug, Deserialize)]
struct ChangeEnvelope {
    data: ChangeData,
}

/// Which rows a channel listens to.
#[derive(Debug, Clone)]
struct ChannelConfig {
    topic: String,
    table: &'static str,
    event: &'static str,
    filter: String,
}

impl ChannelConfig {
    fn join_frame(&self, access_token: &str, reference: String) -> Frame {
        let payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": self.event,
                    "schema": "public",
                    "table": self.table,
                    "filter": self.filter,
                }],
                "private": false,
            },
            "access_token": access_token,
        });
        let mut frame = Frame::new(&self.topic, "phx_join", payload, reference.clone());
        frame.join_ref = Some(reference);
        frame
    }
}

/// Per-socket message refs.
struct Refs(u64);

impl Refs {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

type Decoder<T> = fn(ChangeData) -> Option<PortResult<T>>;

//=========================================================================================
// Decoders
//=========================================================================================

fn change_kind(kind: &str) -> Option<ChangeKind> {
    match kind {
        "INSERT" => Some(ChangeKind::Insert),
        "UPDATE" => Some(ChangeKind::Update),
        "DELETE" => Some(ChangeKind::Delete),
        _ => None,
    }
}

fn decode_trade_change(data: ChangeData) -> Option<PortResult<TradeChange>> {
    let kind = change_kind(&data.kind)?;
    // Deletes only carry the old row.
    let id = data
        .record
        .get("id")
        .or_else(|| data.old_record.get("id"))
        .and_then(Value::as_str)
        .map(Uuid::parse_str);
    Some(match id {
        Some(Ok(trade_id)) => Ok(TradeChange { kind, trade_id }),
        Some(Err(e)) => Err(PortError::Unexpected(format!("bad trade id in change: {}", e))),
        None => Err(PortError::Unexpected("trade change without an id".to_string())),
    })
}

fn decode_message_insert(data: ChangeData) -> Option<PortResult<Message>> {
    if change_kind(&data.kind) != Some(ChangeKind::Insert) {
        return None;
    }
    Some(
        serde_json::from_value::<MessageRecord>(data.record)
            .map(MessageRecord::to_domain)
            .map_err(|e| PortError::Unexpected(format!("bad message record: {}", e))),
    )
}

/// `Ok(())` for an accepted join, the backend's reason otherwise.
fn join_outcome(payload: &Value) -> PortResult<()> {
    match payload.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(()),
        _ => {
            let reason = payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .unwrap_or("channel join rejected");
            Err(PortError::Backend(reason.to_string()))
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct RealtimeAdapter {
    http: BackendHttp,
    heartbeat: Duration,
}

impl RealtimeAdapter {
    pub fn new(http: BackendHttp, heartbeat: Duration) -> Self {
        Self { http, heartbeat }
    }

    async fn subscribe<T: Send + 'static>(
        &self,
        channel: ChannelConfig,
        decode: Decoder<T>,
    ) -> PortResult<Subscription<T>> {
        let url = self.http.websocket_url();
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| PortError::Backend(format!("realtime connect failed: {}", e)))?;
        let (mut sink, mut source) = socket.split();

        let mut refs = Refs(0);
        let join_ref = refs.next();
        let join = channel.join_frame(&self.http.bearer().await, join_ref.clone());
        send_frame(&mut sink, &join).await?;

        tokio::time::timeout(JOIN_TIMEOUT, await_join(&mut source, &channel.topic, &join_ref))
            .await
            .map_err(|_| PortError::Backend(format!("no reply joining {}", channel.topic)))??;
        info!("Joined realtime channel {}", channel.topic);

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let token = CancellationToken::new();
        tokio::spawn(run_channel(
            sink,
            source,
            channel,
            refs,
            self.heartbeat,
            token.clone(),
            tx,
            decode,
        ));

        let changes = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Subscription::new(Box::pin(changes), token))
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> PortResult<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    sink.send(WsMessage::Text(frame.to_text()?))
        .await
        .map_err(|e| PortError::Backend(format!("realtime send failed: {}", e)))
}

async fn await_join<R, E>(source: &mut R, topic: &str, join_ref: &str) -> PortResult<()>
where
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    while let Some(message) = source.next().await {
        let text = match message {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(PortError::Backend(format!("realtime read failed: {}", e))),
        };
        let Ok(frame) = serde_json::from_str::<Frame>(&text) else {
            continue;
        };
        if frame.event == "phx_reply"
            && frame.topic == topic
            && frame.reference.as_deref() == Some(join_ref)
        {
            return join_outcome(&frame.payload);
        }
    }
    Err(PortError::Backend(format!("socket closed while joining {}", topic)))
}

#[allow(clippy::too_many_arguments)]
async fn run_channel<S, R, E, T>(
    mut sink: S,
    mut source: R,
    channel: ChannelConfig,
    mut refs: Refs,
    heartbeat: Duration,
    token: CancellationToken,
    tx: mpsc::Sender<PortResult<T>>,
    decode: Decoder<T>,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    let mut ticker = tokio::time::interval(heartbeat);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let leave = Frame::new(&channel.topic, "phx_leave", json!({}), refs.next());
                if let Err(e) = send_frame(&mut sink, &leave).await {
                    debug!("Leaving {} failed: {:?}", channel.topic, e);
                }
                let _ = sink.send(WsMessage::Close(None)).await;
                info!("Left realtime channel {}", channel.topic);
                break;
            }
            _ = ticker.tick() => {
                let beat = Frame::new("phoenix", "heartbeat", json!({}), refs.next());
                if let Err(e) = send_frame(&mut sink, &beat).await {
                    error!("Heartbeat on {} failed: {:?}", channel.topic, e);
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
            message = source.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    match handle_text(&text, &channel.topic, decode) {
                        Some(Ok(item)) => {
                            if tx.send(Ok(item)).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Realtime frame on {} rejected: {:?}", channel.topic, e);
                            if tx.send(Err(e)).await.is_err() {
                                break;
                            }
                        }
                        None => {}
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    warn!("Realtime socket for {} closed by the server", channel.topic);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Realtime socket for {} failed: {}", channel.topic, e);
                    let _ = tx
                        .send(Err(PortError::Backend(format!("realtime read failed: {}", e))))
                        .await;
                    break;
                }
            }
        }
    }
}

/// Decodes one inbound text frame. `None` for frames that carry no change for
/// this channel (replies, heartbeats acks, presence).
fn handle_text<T>(text: &str, topic: &str, decode: Decoder<T>) -> Option<PortResult<T>> {
    let frame = match serde_json::from_str::<Frame>(text) {
        Ok(frame) => frame,
        Err(e) => return Some(Err(PortError::Unexpected(format!("bad realtime frame: {}", e)))),
    };
    if frame.topic != topic {
        return None;
    }
    match frame.event.as_str() {
        "postgres_changes" => match serde_json::from_value::<ChangeEnvelope>(frame.payload) {
            Ok(envelope) => decode(envelope.data),
            Err(e) => Some(Err(PortError::Unexpected(format!("bad change payload: {}", e)))),
        },
        "phx_error" => Some(Err(PortError::Backend(format!("channel {} errored", topic)))),
        _ => None,
    }
}

//=========================================================================================
// `RealtimeService` Trait Implementation
//=========================================================================================

#[async_trait]
impl RealtimeService for RealtimeAdapter {
    async fn subscribe_trade_changes(
        &self,
        recipient_id: Uuid,
    ) -> PortResult<Subscription<TradeChange>> {
        let channel = ChannelConfig {
            topic: format!("realtime:trades:{}", recipient_id),
            table: "trades",
            event: "*",
            filter: format!("receptor_id=eq.{}", recipient_id),
        };
        self.subscribe(channel, decode_trade_change).await
    }

    async fn subscribe_message_inserts(&self, trade_id: Uuid) -> PortResult<Subscription<Message>> {
        let channel = ChannelConfig {
            topic: format!("realtime:messages:{}", trade_id),
            table: "messages",
            event: "INSERT",
            filter: format!("trade_id=eq.{}", trade_id),
        };
        self.subscribe(channel, decode_message_insert).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "realtime:trades:0b8f1c52-9a2e-4c1d-8f3b-6a7e5d4c3b2a";

    fn push(event_type: &str, record: Value, old_record: Value) -> String {
        json!({
            "topic": TOPIC,
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "type": event_type,
                    "schema": "public",
                    "table": "trades",
                    "commit_timestamp": "2025-03-03T10:00:00Z",
                    "record": record,
                    "old_record": old_record,
                },
                "ids": [1]
            },
            "ref": null
        })
        .to_string()
    }

    #[test]
    fn join_frame_carries_the_row_filter() {
        let channel = ChannelConfig {
            topic: TOPIC.to_string(),
            table: "trades",
            event: "*",
            filter: "receptor_id=eq.abc".to_string(),
        };
        let frame = channel.join_frame("jwt", "1".to_string());
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();

        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
        assert_eq!(value["join_ref"], "1");
        assert_eq!(value["payload"]["access_token"], "jwt");
        let change = &value["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "trades");
        assert_eq!(change["filter"], "receptor_id=eq.abc");
    }

    #[test]
    fn trade_changes_decode_for_insert_update_and_delete() {
        let id = "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d";

        let insert = handle_text(&push("INSERT", json!({"id": id}), json!({})), TOPIC, decode_trade_change);
        let change = insert.unwrap().unwrap();
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(change.trade_id.to_string(), id);

        let update = handle_text(&push("UPDATE", json!({"id": id, "status": "aceita"}), json!({"id": id})), TOPIC, decode_trade_change);
        assert_eq!(update.unwrap().unwrap().kind, ChangeKind::Update);

        let delete = handle_text(&push("DELETE", json!({}), json!({"id": id})), TOPIC, decode_trade_change);
        assert_eq!(delete.unwrap().unwrap().kind, ChangeKind::Delete);
    }

    #[test]
    fn message_inserts_decode_into_messages() {
        let record = json!({
            "id": "3c4d5e6f-7a8b-4c9d-8e0f-1a2b3c4d5e6f",
            "trade_id": "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d",
            "sender_id": "1a2b3c4d-5e6f-4a7b-8c9d-0e1f2a3b4c5d",
            "content": "ok",
            "read": false,
            "created_at": "2025-03-03T10:05:00+00:00"
        });
        let text = push("INSERT", record, json!({}));

        let message = handle_text(&text, TOPIC, decode_message_insert).unwrap().unwrap();
        assert_eq!(message.content, "ok");
        assert!(!message.read);

        let update = push("UPDATE", json!({"id": "x"}), json!({}));
        assert!(handle_text(&update, TOPIC, decode_message_insert).is_none());
    }

    #[test]
    fn frames_for_other_topics_and_replies_are_ignored() {
        let reply = json!({
            "topic": TOPIC,
            "event": "phx_reply",
            "payload": {"status": "ok", "response": {}},
            "ref": "2"
        })
        .to_string();
        assert!(handle_text(&reply, TOPIC, decode_trade_change).is_none());

        let other = push("INSERT", json!({"id": "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d"}), json!({}));
        assert!(handle_text(&other, "realtime:trades:someone-else", decode_trade_change).is_none());

        assert!(matches!(
            handle_text("not json", TOPIC, decode_trade_change),
            Some(Err(PortError::Unexpected(_)))
        ));
    }

    #[test]
    fn join_outcome_reports_rejection_reason() {
        assert!(join_outcome(&json!({"status": "ok", "response": {}})).is_ok());
        assert_eq!(
            join_outcome(&json!({"status": "error", "response": {"reason": "Invalid JWT"}})),
            Err(PortError::Backend("Invalid JWT".to_string()))
        );
    }

    #[tokio::test]
    async fn join_waits_for_the_matching_reply() {
        let frames = vec![
            Ok::<_, String>(WsMessage::Text(
                json!({"topic": "phoenix", "event": "phx_reply", "payload": {"status": "ok"}, "ref": "1"}).to_string(),
            )),
            Ok(WsMessage::Text(
                json!({"topic": TOPIC, "event": "phx_reply", "payload": {"status": "ok", "response": {}}, "ref": "1"}).to_string(),
            )),
        ];
        let mut source = stream::iter(frames);
        assert!(await_join(&mut source, TOPIC, "1").await.is_ok());

        let mut closed = stream::iter(Vec::<Result<WsMessage, String>>::new());
        assert!(await_join(&mut closed, TOPIC, "1").await.is_err());
    }
}
