//! Socket Mode intake: receive `reaction_added` events over a WebSocket and
//! forward them, in order, to the correlator's channel.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use super::SlackClient;
use crate::correlator::ReactionEvent;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct Envelope {
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    payload: Option<EventsApiPayload>,
}

#[derive(Deserialize)]
struct EventsApiPayload {
    event: SlackEvent,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum SlackEvent {
    #[serde(rename = "reaction_added")]
    ReactionAdded(ReactionAdded),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReactionAdded {
    pub user: String,
    pub reaction: String,
    pub item: ReactionItem,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReactionItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: Option<String>,
    pub ts: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum Frame {
    Hello,
    /// Slack is about to close the socket; reconnect.
    Disconnect,
    Reaction {
        envelope_id: Option<String>,
        event: ReactionAdded,
    },
    /// Anything else. Still acknowledged if it carries an envelope id.
    Other { envelope_id: Option<String> },
}

pub fn parse_frame(text: &str) -> Frame {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable socket mode frame");
            return Frame::Other { envelope_id: None };
        }
    };
    match envelope.kind.as_str() {
        "hello" => Frame::Hello,
        "disconnect" => Frame::Disconnect,
        "events_api" => match envelope.payload.map(|p| p.event) {
            Some(SlackEvent::ReactionAdded(event)) if event.item.kind == "message" => {
                Frame::Reaction {
                    envelope_id: envelope.envelope_id,
                    event,
                }
            }
            _ => Frame::Other {
                envelope_id: envelope.envelope_id,
            },
        },
        _ => Frame::Other {
            envelope_id: envelope.envelope_id,
        },
    }
}

pub fn ack_frame(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

impl SlackClient {
    /// Enrich a raw reaction with the reacted message's correlation metadata.
    /// Lookup failures yield an event without metadata, which the correlator drops.
    pub async fn reaction_event(&self, raw: ReactionAdded) -> ReactionEvent {
        let metadata = match (raw.item.channel.as_deref(), raw.item.ts.as_deref()) {
            (Some(channel), Some(ts)) => match self.message_metadata(channel, ts).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(channel, error = %e, "could not fetch reacted message");
                    None
                }
            },
            _ => None,
        };
        ReactionEvent {
            user_id: raw.user,
            emoji: raw.reaction,
            channel: raw.item.channel,
            message_ts: raw.item.ts,
            metadata,
        }
    }
}

enum SessionEnd {
    Reconnect,
    Shutdown,
}

/// Keep a Socket Mode session open until `shutdown` flips or the consumer
/// goes away, reconnecting after a fixed delay.
pub async fn run(
    client: SlackClient,
    events: mpsc::Sender<ReactionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        match session(&client, &events, &mut shutdown).await {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Reconnect) => tracing::info!("socket mode session ended, reconnecting"),
            Err(e) => tracing::warn!(error = %format!("{:#}", e), "socket mode session failed"),
        }
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("socket mode intake stopped");
}

async fn session(
    client: &SlackClient,
    events: &mpsc::Sender<ReactionEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd> {
    let url = tokio::select! {
        url = client.open_socket_url() => url?,
        _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
    };
    let connect = tokio::time::timeout(
        CONNECT_TIMEOUT,
        tokio_tungstenite::connect_async(url.as_str()),
    );
    let (ws, _resp) = tokio::select! {
        connected = connect => connected
            .context("timed out connecting socket mode websocket")?
            .context("failed to connect socket mode websocket")?,
        _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
    };
    tracing::info!("socket mode connected");

    let (mut sink, mut stream) = ws.split();
    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = shutdown.changed() => {
                let _ = sink.close().await;
                return Ok(SessionEnd::Shutdown);
            }
        };
        let Some(msg) = next else {
            return Ok(SessionEnd::Reconnect);
        };

        match msg.context("socket mode read failed")? {
            Message::Text(text) => match parse_frame(&text) {
                Frame::Hello => tracing::debug!("socket mode hello"),
                Frame::Disconnect => return Ok(SessionEnd::Reconnect),
                Frame::Reaction { envelope_id, event } => {
                    if let Some(id) = envelope_id {
                        sink.send(Message::Text(ack_frame(&id))).await?;
                    }
                    let reaction = client.reaction_event(event).await;
                    if events.send(reaction).await.is_err() {
                        tracing::info!("reaction consumer gone, closing socket");
                        let _ = sink.close().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                Frame::Other { envelope_id } => {
                    if let Some(id) = envelope_id {
                        sink.send(Message::Text(ack_frame(&id))).await?;
                    }
                }
            },
            Message::Ping(payload) => sink.send(Message::Pong(payload)).await?,
            Message::Close(_) => return Ok(SessionEnd::Reconnect),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reaction_added() {
        let frame = parse_frame(
            r#"{
                "envelope_id": "env-1",
                "type": "events_api",
                "payload": {
                    "event": {
                        "type": "reaction_added",
                        "user": "U123",
                        "reaction": "white_check_mark",
                        "item": {"type": "message", "channel": "C1", "ts": "1700000000.000100"},
                        "event_ts": "1700000001.000200"
                    }
                }
            }"#,
        );
        assert_eq!(
            frame,
            Frame::Reaction {
                envelope_id: Some("env-1".into()),
                event: ReactionAdded {
                    user: "U123".into(),
                    reaction: "white_check_mark".into(),
                    item: ReactionItem {
                        kind: "message".into(),
                        channel: Some("C1".into()),
                        ts: Some("1700000000.000100".into()),
                    },
                },
            }
        );
    }

    #[test]
    fn test_reaction_on_file_is_other() {
        let frame = parse_frame(
            r#"{"envelope_id":"env-2","type":"events_api","payload":{"event":{
                "type":"reaction_added","user":"U1","reaction":"x",
                "item":{"type":"file","file":"F1"}}}}"#,
        );
        assert_eq!(frame, Frame::Other { envelope_id: Some("env-2".into()) });
    }

    #[test]
    fn test_other_events_still_acked() {
        let frame = parse_frame(
            r#"{"envelope_id":"env-3","type":"events_api","payload":{"event":{"type":"message","text":"hi"}}}"#,
        );
        assert_eq!(frame, Frame::Other { envelope_id: Some("env-3".into()) });
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(parse_frame(r#"{"type":"hello","num_connections":1}"#), Frame::Hello);
        assert_eq!(
            parse_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#),
            Frame::Disconnect
        );
        assert_eq!(parse_frame("garbage"), Frame::Other { envelope_id: None });
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_stalled_handshake() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        // Accepts TCP but never answers the websocket upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((conn, _)) = listener.accept().await {
                held.push(conn);
            }
        });

        let slack_api = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/apps.connections.open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "url": format!("ws://{}/link", addr)
            })))
            .mount(&slack_api)
            .await;

        let client = SlackClient::new("xoxb-test", Some("xapp-test".into()))
            .unwrap()
            .with_base_url(slack_api.uri());
        let (events_tx, _events_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let intake = tokio::spawn(run(client, events_tx, stop_rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), intake)
            .await
            .expect("intake should stop while the handshake is stalled")
            .unwrap();
    }

    #[test]
    fn test_ack_frame() {
        let ack: serde_json::Value = serde_json::from_str(&ack_frame("env-9")).unwrap();
        assert_eq!(ack, serde_json::json!({"envelope_id": "env-9"}));
    }
}
