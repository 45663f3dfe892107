use std::net::TcpStream;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

use super::{ChatOutput, Frontend, FrontendEvent, FrontendSettings, VoiceControl};
use crate::{
    build_companion, jitter_ratio, split_text_chunks, AkariConfig, AkariError, AkariResult,
    CommandSynthesizer, ProcessPlayer,
};

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
const API_BASE: &str = "https://discord.com/api/v10";
const MESSAGE_CHUNK_CHARS: usize = 2000;
/// GUILDS | GUILD_VOICE_STATES | GUILD_MESSAGES | MESSAGE_CONTENT
pub(crate) const GATEWAY_INTENTS: u64 = 1 | (1 << 7) | (1 << 9) | (1 << 15);
const SOCKET_READ_TIMEOUT: Duration = Duration::from_millis(250);
const LOOP_TICK: Duration = Duration::from_millis(200);

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_VOICE_STATE_UPDATE: u64 = 4;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;

type GatewaySocket = WebSocket<MaybeTlsStream<TcpStream>>;

pub(crate) fn identify_payload(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "akari",
                "device": "akari",
            },
        },
    })
}

pub(crate) fn heartbeat_payload(seq: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": seq })
}

pub(crate) fn voice_state_payload(guild_id: &str, channel_id: Option<&str>) -> Value {
    json!({
        "op": OP_VOICE_STATE_UPDATE,
        "d": {
            "guild_id": guild_id,
            "channel_id": channel_id,
            "self_mute": false,
            "self_deaf": false,
        },
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn voice_state_event(guild_id: &str, state: &Value) -> Option<FrontendEvent> {
    Some(FrontendEvent::VoiceState {
        guild_id: str_field(state, "guild_id").unwrap_or_else(|| guild_id.to_string()),
        user_id: str_field(state, "user_id")?,
        channel_id: str_field(state, "channel_id"),
    })
}

fn channel_event(channel: &Value) -> Option<FrontendEvent> {
    Some(FrontendEvent::ChannelName {
        channel_id: str_field(channel, "id")?,
        name: str_field(channel, "name")?,
    })
}

/// Maps a gateway dispatch to the events the frontend cares about.
pub(crate) fn parse_dispatch(event_type: &str, data: &Value) -> Vec<FrontendEvent> {
    match event_type {
        "READY" => data
            .get("user")
            .and_then(|u| str_field(u, "id"))
            .map(|user_id| vec![FrontendEvent::Ready { user_id }])
            .unwrap_or_default(),
        "GUILD_CREATE" => {
            let guild_id = str_field(data, "id").unwrap_or_default();
            let mut events: Vec<FrontendEvent> = data
                .get("channels")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
                .filter_map(channel_event)
                .collect();
            events.extend(
                data.get("voice_states")
                    .and_then(|v| v.as_array())
                    .into_iter()
                    .flatten()
                    .filter_map(|state| voice_state_event(&guild_id, state)),
            );
            events
        }
        "CHANNEL_CREATE" | "CHANNEL_UPDATE" => channel_event(data).into_iter().collect(),
        "VOICE_STATE_UPDATE" => {
            let guild_id = str_field(data, "guild_id").unwrap_or_default();
            voice_state_event(&guild_id, data).into_iter().collect()
        }
        "MESSAGE_CREATE" => {
            let author = data.get("author").cloned().unwrap_or(Value::Null);
            let (Some(author_id), Some(channel_id)) =
                (str_field(&author, "id"), str_field(data, "channel_id"))
            else {
                return Vec::new();
            };
            vec![FrontendEvent::Message {
                author_id,
                author_is_bot: author.get("bot").and_then(|v| v.as_bool()).unwrap_or(false),
                guild_id: str_field(data, "guild_id"),
                channel_id,
                content: str_field(data, "content").unwrap_or_default(),
            }]
        }
        _ => Vec::new(),
    }
}

fn set_read_timeout(socket: &GatewaySocket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

fn send_json(socket: &mut GatewaySocket, payload: &Value) -> AkariResult<()> {
    socket.send(Message::Text(payload.to_string().into()))?;
    Ok(())
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

/// One gateway connection: hello, identify, then heartbeats, outbound
/// commands and dispatches until the socket drops.
fn run_gateway_session(
    token: &str,
    events: &mpsc::Sender<FrontendEvent>,
    outbound: &Mutex<mpsc::Receiver<Value>>,
) -> AkariResult<String> {
    let (mut socket, _) = connect(GATEWAY_URL)?;
    set_read_timeout(&socket, SOCKET_READ_TIMEOUT)?;

    let mut heartbeat_every: Option<Duration> = None;
    let mut next_heartbeat = Instant::now();
    let mut seq: Option<u64> = None;

    loop {
        if let Some(interval) = heartbeat_every {
            if Instant::now() >= next_heartbeat {
                send_json(&mut socket, &heartbeat_payload(seq))?;
                next_heartbeat = Instant::now() + interval;
            }
        }

        if let Ok(queue) = outbound.lock() {
            loop {
                match queue.try_recv() {
                    Ok(payload) => send_json(&mut socket, &payload)?,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return Ok("frontend gone".to_string()),
                }
            }
        }

        let message = match socket.read() {
            Ok(message) => message,
            Err(err) if is_timeout(&err) => continue,
            Err(err) => return Err(err.into()),
        };

        let text = match message {
            Message::Text(text) => text.as_str().to_string(),
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Ping(payload) => {
                let _ = socket.send(Message::Pong(payload));
                continue;
            }
            Message::Close(frame) => {
                return Ok(frame
                    .map(|f| format!("close {}: {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_else(|| "socket closed".to_string()));
            }
            _ => continue,
        };
        let payload: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "gateway payload parse error");
                continue;
            }
        };

        match payload.get("op").and_then(|v| v.as_u64()) {
            Some(OP_HELLO) => {
                let interval_ms = payload
                    .get("d")
                    .and_then(|d| d.get("heartbeat_interval"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(41_250);
                let interval = Duration::from_millis(interval_ms);
                heartbeat_every = Some(interval);
                next_heartbeat = Instant::now() + interval.mul_f64(jitter_ratio());
                send_json(&mut socket, &identify_payload(token))?;
                tracing::debug!(interval_ms, "gateway hello");
            }
            Some(OP_DISPATCH) => {
                if let Some(s) = payload.get("s").and_then(|v| v.as_u64()) {
                    seq = Some(s);
                }
                let event_type = payload.get("t").and_then(|v| v.as_str()).unwrap_or("");
                let data = payload.get("d").cloned().unwrap_or(Value::Null);
                for event in parse_dispatch(event_type, &data) {
                    if events.send(event).is_err() {
                        return Ok("frontend gone".to_string());
                    }
                }
            }
            Some(OP_HEARTBEAT) => {
                send_json(&mut socket, &heartbeat_payload(seq))?;
            }
            Some(OP_RECONNECT) => return Ok("gateway requested reconnect".to_string()),
            Some(OP_INVALID_SESSION) => return Ok("invalid session".to_string()),
            _ => {}
        }
    }
}

fn spawn_gateway_listener(
    token: String,
    events: mpsc::Sender<FrontendEvent>,
    outbound: Arc<Mutex<mpsc::Receiver<Value>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reason = match run_gateway_session(&token, &events, &outbound) {
            Ok(reason) => reason,
            Err(err) => err.to_string(),
        };
        let _ = events.send(FrontendEvent::Disconnected(reason));
    })
}

/// REST message sender.
pub(crate) struct DiscordRest {
    http: ureq::Agent,
    token: String,
}

impl DiscordRest {
    pub(crate) fn new(token: String, timeout_ms: u64) -> Self {
        let timeout = Duration::from_millis(timeout_ms);
        let http = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { http, token }
    }

    pub(crate) fn send_message(&self, channel_id: &str, text: &str) -> AkariResult<()> {
        let url = format!("{API_BASE}/channels/{channel_id}/messages");
        for chunk in split_text_chunks(text, MESSAGE_CHUNK_CHARS) {
            let result = self
                .http
                .post(&url)
                .set("Authorization", &format!("Bot {}", self.token))
                .send_json(json!({ "content": chunk }));
            match result {
                Ok(_) => {}
                Err(ureq::Error::Status(code, resp)) => {
                    let body = resp.into_string().unwrap_or_default();
                    return Err(AkariError::Discord(format!("send message {code}: {body}")));
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

impl ChatOutput for DiscordRest {
    fn send(&mut self, channel_id: &str, text: &str) {
        if let Err(err) = self.send_message(channel_id, text) {
            tracing::error!(channel_id, error = %err, "discord send failed");
        }
    }
}

/// Queues op 4 frames for whichever gateway connection is live.
pub(crate) struct GatewayVoice {
    outbound: mpsc::Sender<Value>,
}

impl VoiceControl for GatewayVoice {
    fn update_voice_state(&mut self, guild_id: &str, channel_id: Option<&str>) {
        if self
            .outbound
            .send(voice_state_payload(guild_id, channel_id))
            .is_err()
        {
            tracing::warn!(guild_id, "gateway outbound queue closed");
        }
    }
}

fn default_transcriber_command() -> AkariResult<Vec<String>> {
    let exe = std::env::current_exe()?;
    Ok(vec![exe.display().to_string(), "transcribe".to_string()])
}

pub(crate) fn run_discord_bot(config: AkariConfig) -> AkariResult<()> {
    let token = config
        .discord_token
        .clone()
        .ok_or_else(|| AkariError::Config("Missing DISCORD_TOKEN".to_string()))?;
    let companion = build_companion(&config)?;
    let transcriber_command = match &config.transcriber_command {
        Some(command) => command.clone(),
        None => default_transcriber_command()?,
    };

    let (events_tx, events_rx) = mpsc::channel::<FrontendEvent>();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Value>();
    let outbound_rx = Arc::new(Mutex::new(outbound_rx));

    let mut frontend = Frontend::new(
        companion,
        Box::new(CommandSynthesizer {
            command: config.tts_command.clone(),
        }),
        Box::new(ProcessPlayer::new(config.player_command.clone())),
        Box::new(DiscordRest::new(token.clone(), config.http_timeout_ms)),
        Box::new(GatewayVoice {
            outbound: outbound_tx,
        }),
        FrontendSettings {
            output_wav: config.output_wav.clone(),
            speech_speed: config.speech_speed,
            transcriber_command,
        },
        events_tx.clone(),
    );

    let mut reconnect_delay = Duration::from_secs(1);
    let max_reconnect_delay = Duration::from_secs(30);
    tracing::info!(wav = %config.output_wav.display(), "discord bot starting");

    loop {
        let _listener = spawn_gateway_listener(token.clone(), events_tx.clone(), outbound_rx.clone());

        loop {
            match events_rx.recv_timeout(LOOP_TICK) {
                Ok(FrontendEvent::Disconnected(reason)) => {
                    tracing::warn!(reason = %reason, "gateway disconnected");
                    break;
                }
                Ok(event) => {
                    if matches!(event, FrontendEvent::Ready { .. }) {
                        reconnect_delay = Duration::from_secs(1);
                    }
                    frontend.handle_event(event);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    frontend.shutdown();
                    return Ok(());
                }
            }
            frontend.check_output_wav();
        }

        thread::sleep(reconnect_delay);
        reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
    }
}
