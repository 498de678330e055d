//! Slack Socket Mode: open a WebSocket via apps.connections.open, ack every envelope,
//! and forward decoded events to the bot.

use crate::channels::inbound::{InboundEvent, SlackFile};
use crate::channels::slack::SlackClient;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const RECONNECT_DELAY_SECS: u64 = 2;

/// One Socket Mode frame after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Present on every frame that must be acknowledged.
    pub envelope_id: Option<String>,
    pub body: EnvelopeBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    Hello,
    /// Slack asks the client to reconnect (e.g. "refresh_requested").
    Disconnect(String),
    Event(InboundEvent),
    /// Frame type or event we do not handle.
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventCallback {
    event: RawEvent,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    files: Vec<SlackFile>,
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    command: String,
    trigger_id: String,
    channel_id: String,
    user_id: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RawInteraction {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    view: Option<RawView>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawView {
    #[serde(default)]
    callback_id: String,
    #[serde(default)]
    private_metadata: String,
    #[serde(default)]
    state: Option<RawViewState>,
}

#[derive(Debug, Deserialize)]
struct RawViewState {
    #[serde(default)]
    values: Value,
}

/// Decode one text frame from the Socket Mode WebSocket.
pub fn decode_envelope(text: &str) -> Result<Envelope, serde_json::Error> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let body = decode_payload(&raw.typ, raw.payload, raw.reason).unwrap_or_else(|e| {
        log::debug!("slack socket mode: malformed {} payload: {}", raw.typ, e);
        EnvelopeBody::Ignored(raw.typ.clone())
    });
    Ok(Envelope {
        envelope_id: raw.envelope_id,
        body,
    })
}

/// A malformed payload still yields an envelope so its id gets acknowledged.
fn decode_payload(
    typ: &str,
    payload: Value,
    reason: Option<String>,
) -> Result<EnvelopeBody, serde_json::Error> {
    Ok(match typ {
        "hello" => EnvelopeBody::Hello,
        "disconnect" => EnvelopeBody::Disconnect(reason.unwrap_or_default()),
        "events_api" => decode_event(serde_json::from_value(payload)?),
        "slash_commands" => {
            let cmd: RawCommand = serde_json::from_value(payload)?;
            EnvelopeBody::Event(InboundEvent::SlashCommand {
                command: cmd.command,
                trigger_id: cmd.trigger_id,
                channel_id: cmd.channel_id,
                user_id: cmd.user_id,
                text: cmd.text,
            })
        }
        "interactive" => decode_interaction(serde_json::from_value(payload)?),
        other => EnvelopeBody::Ignored(other.to_string()),
    })
}

fn decode_event(callback: EventCallback) -> EnvelopeBody {
    let ev = callback.event;
    let (Some(channel), Some(ts)) = (ev.channel, ev.ts) else {
        return EnvelopeBody::Ignored(ev.typ);
    };
    match ev.typ.as_str() {
        "app_mention" => EnvelopeBody::Event(InboundEvent::AppMention {
            channel,
            ts,
            thread_ts: ev.thread_ts,
        }),
        // Edits, deletions and other subtypes carry no new uploads.
        "message" if matches!(ev.subtype.as_deref(), None | Some("file_share")) => {
            EnvelopeBody::Event(InboundEvent::Message {
                channel,
                ts,
                thread_ts: ev.thread_ts,
                bot_id: ev.bot_id,
                files: ev.files,
            })
        }
        _ => EnvelopeBody::Ignored(ev.typ),
    }
}

fn decode_interaction(interaction: RawInteraction) -> EnvelopeBody {
    if interaction.typ != "view_submission" {
        return EnvelopeBody::Ignored(interaction.typ);
    }
    let (Some(user), Some(view)) = (interaction.user, interaction.view) else {
        return EnvelopeBody::Ignored(interaction.typ);
    };
    EnvelopeBody::Event(InboundEvent::ViewSubmission {
        callback_id: view.callback_id,
        user_id: user.id,
        private_metadata: view.private_metadata,
        values: view.state.map(|s| s.values).unwrap_or(Value::Null),
    })
}

/// Frame sent back to Slack to acknowledge an envelope.
pub fn ack_frame(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

/// Socket Mode connector: reconnects until stopped.
pub struct SocketModeListener {
    client: SlackClient,
    app_token: String,
    running: AtomicBool,
    shutdown: Notify,
}

impl SocketModeListener {
    pub fn new(client: SlackClient, app_token: String) -> Self {
        Self {
            client,
            app_token,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the connection loop and forward events to `inbound_tx`. Returns a handle to await on shutdown.
    pub fn start(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("slack socket mode: starting");
        tokio::spawn(async move {
            run_socket_loop(self, inbound_tx).await;
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// One WebSocket session. Ok(false) means the inbound receiver is gone and the loop should end.
    async fn run_connection(&self, inbound_tx: &mpsc::Sender<InboundEvent>) -> Result<bool, String> {
        let url = self
            .client
            .open_socket_url(&self.app_token)
            .await
            .map_err(|e| e.to_string())?;
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| e.to_string())?;
        log::info!("slack socket mode: connected");

        while self.running() {
            let msg = tokio::select! {
                _ = self.shutdown.notified() => break,
                msg = ws.next() => msg,
            };
            let Some(msg) = msg else { break };
            let text = match msg.map_err(|e| e.to_string())? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let envelope = match decode_envelope(&text) {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("slack socket mode: undecodable frame: {}", e);
                    continue;
                }
            };
            if let Some(ref id) = envelope.envelope_id {
                ws.send(Message::Text(ack_frame(id)))
                    .await
                    .map_err(|e| e.to_string())?;
            }
            match envelope.body {
                EnvelopeBody::Hello => log::debug!("slack socket mode: hello"),
                EnvelopeBody::Disconnect(reason) => {
                    log::info!("slack socket mode: disconnect requested ({})", reason);
                    break;
                }
                EnvelopeBody::Event(event) => {
                    if inbound_tx.send(event).await.is_err() {
                        log::debug!("slack socket mode: inbound channel closed, stopping");
                        return Ok(false);
                    }
                }
                EnvelopeBody::Ignored(kind) => log::debug!("slack socket mode: ignoring {}", kind),
            }
        }
        let _ = ws.close(None).await;
        Ok(true)
    }
}

async fn run_socket_loop(listener: Arc<SocketModeListener>, inbound_tx: mpsc::Sender<InboundEvent>) {
    while listener.running() {
        match listener.run_connection(&inbound_tx).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                log::warn!("slack socket mode error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
            }
        }
    }
    log::info!("slack socket mode: stopped");
}
