pub(crate) mod discord;

pub(crate) use discord::*;

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::SystemTime;

use crate::{
    build_external_command, kill_process_tree, parse_say_args, Companion, SayParse, Synthesizer,
    ToolObserver, VoicePlayer,
};

pub(crate) const SEARCH_ANNOUNCEMENT: &str = "🔍 マスターの代わりに検索してみるね！";

/// Text channel sink.
pub(crate) trait ChatOutput {
    fn send(&mut self, channel_id: &str, text: &str);
}

/// Voice presence. `None` leaves the guild's voice channel.
pub(crate) trait VoiceControl {
    fn update_voice_state(&mut self, guild_id: &str, channel_id: Option<&str>);
}

/// Everything the main loop reacts to, whichever thread produced it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FrontendEvent {
    Ready {
        user_id: String,
    },
    Message {
        author_id: String,
        author_is_bot: bool,
        guild_id: Option<String>,
        channel_id: String,
        content: String,
    },
    VoiceState {
        guild_id: String,
        user_id: String,
        channel_id: Option<String>,
    },
    ChannelName {
        channel_id: String,
        name: String,
    },
    Transcript {
        generation: u64,
        line: String,
    },
    TranscriberExited {
        generation: u64,
    },
    Disconnected(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VoiceSession {
    pub(crate) guild_id: String,
    pub(crate) channel_id: String,
}

struct Transcriber {
    child: Child,
    generation: u64,
    channel_id: String,
}

struct SearchAnnounce<'a> {
    output: &'a mut dyn ChatOutput,
    channel_id: &'a str,
}

impl ToolObserver for SearchAnnounce<'_> {
    fn on_tool_start(&mut self, tool: &str, _input: &str) {
        if tool == "WebSearch" {
            self.output.send(self.channel_id, SEARCH_ANNOUNCEMENT);
        }
    }
}

pub(crate) struct FrontendSettings {
    pub(crate) output_wav: PathBuf,
    pub(crate) speech_speed: f64,
    pub(crate) transcriber_command: Vec<String>,
}

/// Command handling and voice bookkeeping for one bot session. Owned by the
/// main loop; nothing here is shared across threads.
pub(crate) struct Frontend {
    companion: Companion,
    synth: Box<dyn Synthesizer>,
    player: Box<dyn VoicePlayer>,
    output: Box<dyn ChatOutput>,
    voice: Box<dyn VoiceControl>,
    settings: FrontendSettings,
    events: mpsc::Sender<FrontendEvent>,
    bot_user_id: Option<String>,
    voice_states: HashMap<String, VoiceSession>,
    channel_names: HashMap<String, String>,
    session: Option<VoiceSession>,
    latest_mtime: Option<SystemTime>,
    transcriber: Option<Transcriber>,
    next_generation: u64,
}

impl Frontend {
    pub(crate) fn new(
        companion: Companion,
        synth: Box<dyn Synthesizer>,
        player: Box<dyn VoicePlayer>,
        output: Box<dyn ChatOutput>,
        voice: Box<dyn VoiceControl>,
        settings: FrontendSettings,
        events: mpsc::Sender<FrontendEvent>,
    ) -> Self {
        Self {
            companion,
            synth,
            player,
            output,
            voice,
            settings,
            events,
            bot_user_id: None,
            voice_states: HashMap::new(),
            channel_names: HashMap::new(),
            session: None,
            latest_mtime: None,
            transcriber: None,
            next_generation: 0,
        }
    }

    pub(crate) fn session(&self) -> Option<&VoiceSession> {
        self.session.as_ref()
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.transcriber.is_some()
    }

    pub(crate) fn handle_event(&mut self, event: FrontendEvent) {
        match event {
            FrontendEvent::Ready { user_id } => {
                tracing::info!(user_id = %user_id, "logged in");
                self.bot_user_id = Some(user_id);
            }
            FrontendEvent::Message {
                author_id,
                author_is_bot,
                guild_id,
                channel_id,
                content,
            } => {
                if author_is_bot || self.bot_user_id.as_deref() == Some(author_id.as_str()) {
                    return;
                }
                self.handle_command(&author_id, guild_id.as_deref(), &channel_id, &content);
            }
            FrontendEvent::VoiceState {
                guild_id,
                user_id,
                channel_id,
            } => self.record_voice_state(guild_id, user_id, channel_id),
            FrontendEvent::ChannelName { channel_id, name } => {
                self.channel_names.insert(channel_id, name);
            }
            FrontendEvent::Transcript { generation, line } => {
                if self.transcriber.as_ref().map(|t| t.generation) == Some(generation) {
                    self.handle_transcript_line(&line);
                }
            }
            FrontendEvent::TranscriberExited { generation } => {
                if self.transcriber.as_ref().map(|t| t.generation) == Some(generation) {
                    tracing::warn!("transcriber exited");
                    if let Some(mut t) = self.transcriber.take() {
                        let _ = t.child.wait();
                    }
                }
            }
            FrontendEvent::Disconnected(reason) => {
                tracing::warn!(reason = %reason, "gateway disconnected");
            }
        }
    }

    fn record_voice_state(&mut self, guild_id: String, user_id: String, channel_id: Option<String>) {
        let is_self = self.bot_user_id.as_deref() == Some(user_id.as_str());
        match channel_id {
            Some(channel_id) => {
                let state = VoiceSession {
                    guild_id,
                    channel_id,
                };
                if is_self {
                    self.session = Some(state.clone());
                }
                self.voice_states.insert(user_id, state);
            }
            None => {
                if is_self
                    && self.session.as_ref().map(|s| s.guild_id.as_str()) == Some(guild_id.as_str())
                {
                    self.session = None;
                    self.player.stop();
                }
                self.voice_states.remove(&user_id);
            }
        }
    }

    /// Dispatches one `!command`. Anything else is ignored.
    pub(crate) fn handle_command(
        &mut self,
        author_id: &str,
        guild_id: Option<&str>,
        channel_id: &str,
        content: &str,
    ) {
        let Some(body) = content.trim().strip_prefix('!') else {
            return;
        };
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };
        tracing::info!(command = name, channel_id, "command received");

        match name {
            "join" => self.cmd_join(author_id, guild_id, channel_id),
            "leave" => self.cmd_leave(),
            "play" => self.cmd_play(channel_id, args),
            "say" => self.cmd_say(channel_id, args),
            "chat" if !args.is_empty() => self.chat(channel_id, args),
            "forget" => {
                self.companion.forget();
                self.output
                    .send(channel_id, "🧠 あかりちゃんの記憶をリセットしたよ。");
            }
            "listen" => self.cmd_listen(channel_id),
            "stop" => self.cmd_stop(channel_id),
            _ => {}
        }
    }

    fn cmd_join(&mut self, author_id: &str, guild_id: Option<&str>, channel_id: &str) {
        let state = self
            .voice_states
            .get(author_id)
            .filter(|s| guild_id.is_none() || guild_id == Some(s.guild_id.as_str()))
            .cloned();
        let Some(state) = state else {
            self.output
                .send(channel_id, "VCに入ってからコマンドを実行してね。");
            return;
        };
        self.voice
            .update_voice_state(&state.guild_id, Some(state.channel_id.as_str()));
        let name = self
            .channel_names
            .get(&state.channel_id)
            .cloned()
            .unwrap_or_else(|| state.channel_id.clone());
        self.session = Some(state);
        self.output
            .send(channel_id, &format!("🔊 あかりが `{name}` にログインしたよ！"));
    }

    fn cmd_leave(&mut self) {
        if let Some(session) = self.session.take() {
            self.player.stop();
            self.voice.update_voice_state(&session.guild_id, None);
        }
    }

    fn cmd_play(&mut self, channel_id: &str, args: &str) {
        if self.session.is_none() {
            self.output
                .send(channel_id, "VCに入ってないよ。まず `!join` してね。");
            return;
        }
        let file = args
            .split_whitespace()
            .next()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.settings.output_wav.clone());
        if self.player.is_playing() {
            self.output.send(channel_id, "⚠️ 現在再生中です。");
            return;
        }
        if let Err(err) = self.player.play(&file) {
            tracing::warn!(error = %err, file = %file.display(), "playback failed");
            self.output
                .send(channel_id, &format!("❌ エラーが発生しました：{err}"));
        }
    }

    fn cmd_say(&mut self, channel_id: &str, args: &str) {
        if self.session.is_none() {
            self.output.send(channel_id, "まず `!join` でVCに入ってね。");
            return;
        }
        let (speed, text) = match parse_say_args(args) {
            Ok(SayParse::Speak { speed, text }) => (speed, text),
            Ok(SayParse::BadSpeed) => {
                self.output.send(channel_id, "⚠️ 話速は数値で指定してね！");
                return;
            }
            Ok(SayParse::NoText) => {
                self.output
                    .send(channel_id, "⚠️ 読み上げるテキストがないよ！");
                return;
            }
            Err(err) => {
                self.output
                    .send(channel_id, &format!("❌ エラーが発生しました：{err}"));
                return;
            }
        };

        if let Err(err) = self.synth.synthesize(&text, speed) {
            self.output
                .send(channel_id, &format!("❌ エラーが発生しました：{err}"));
            return;
        }
        if self.player.is_playing() {
            self.output.send(channel_id, "⚠️ 現在再生中です。");
            return;
        }
        let wav = self.settings.output_wav.clone();
        if let Err(err) = self.play_output(&wav) {
            self.output
                .send(channel_id, &format!("❌ エラーが発生しました：{err}"));
        }
    }

    /// Agent turn, reply, then speech. Transcribed lines take the same path.
    pub(crate) fn chat(&mut self, channel_id: &str, message: &str) {
        let mut observer = SearchAnnounce {
            output: self.output.as_mut(),
            channel_id,
        };
        let reply = match self.companion.respond(message, &mut observer) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(error = %err, "agent turn failed");
                self.output
                    .send(channel_id, &format!("❌ エージェントエラー：{err}"));
                return;
            }
        };
        self.output.send(channel_id, &format!("💬 あかり: {reply}"));

        if let Err(err) = self.synth.synthesize(&reply, self.settings.speech_speed) {
            self.output
                .send(channel_id, &format!("❌ エージェントエラー：{err}"));
            return;
        }
        if self.session.is_some() && !self.player.is_playing() {
            let wav = self.settings.output_wav.clone();
            if let Err(err) = self.play_output(&wav) {
                tracing::warn!(error = %err, "reply playback failed");
            }
        }
    }

    fn play_output(&mut self, wav: &Path) -> crate::AkariResult<()> {
        self.player.play(wav)?;
        // the monitor must not replay a file we just started
        self.latest_mtime = modified_time(wav);
        Ok(())
    }

    fn cmd_listen(&mut self, channel_id: &str) {
        if self.transcriber.is_some() {
            self.output.send(channel_id, "⚠️ すでに通話中です。");
            return;
        }
        self.output
            .send(channel_id, "🎤 通話モードを開始します… お待ちください");

        let generation = self.next_generation;
        self.next_generation += 1;
        match spawn_transcriber(&self.settings.transcriber_command, generation, self.events.clone()) {
            Ok(child) => {
                tracing::info!(pid = child.id(), "transcriber started");
                self.transcriber = Some(Transcriber {
                    child,
                    generation,
                    channel_id: channel_id.to_string(),
                });
            }
            Err(err) => {
                tracing::error!(error = %err, "transcriber spawn failed");
                self.output
                    .send(channel_id, &format!("❌ エラーが発生しました：{err}"));
            }
        }
    }

    fn cmd_stop(&mut self, channel_id: &str) {
        match self.transcriber.take() {
            Some(mut t) => {
                kill_process_tree(&mut t.child);
                self.output.send(channel_id, "🛑 通話モードを停止しました。");
            }
            None => self.output.send(channel_id, "⚠️ 現在は通話しておりません。"),
        }
    }

    fn handle_transcript_line(&mut self, line: &str) {
        let Some(t) = self.transcriber.as_ref() else {
            return;
        };
        let channel_id = t.channel_id.clone();
        let text = line.trim();

        if text.to_uppercase().contains("ERROR") {
            self.output.send(
                &channel_id,
                &format!("⚠️ 音声認識でエラーが発生しました: `{text}`"),
            );
            return;
        }
        if text == "READY" {
            self.output.send(
                &channel_id,
                "✅ モデルの初期化が完了しました！話しかけてみてね。",
            );
            return;
        }
        if text.is_empty() {
            return;
        }
        self.output.send(&channel_id, &format!("マスター: {text}"));
        self.chat(&channel_id, text);
    }

    /// Plays the output WAV when something else rewrote it.
    pub(crate) fn check_output_wav(&mut self) {
        let Some(mtime) = modified_time(&self.settings.output_wav) else {
            return;
        };
        if self.latest_mtime == Some(mtime) {
            return;
        }
        self.latest_mtime = Some(mtime);
        tracing::debug!(file = %self.settings.output_wav.display(), "output wav changed");
        if self.session.is_some() && !self.player.is_playing() {
            tracing::info!("playing updated output wav");
            let wav = self.settings.output_wav.clone();
            if let Err(err) = self.player.play(&wav) {
                tracing::warn!(error = %err, "monitor playback failed");
            }
        }
    }

    pub(crate) fn shutdown(&mut self) {
        if let Some(mut t) = self.transcriber.take() {
            kill_process_tree(&mut t.child);
        }
        self.player.stop();
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Spawns the helper with piped stdout and forwards each line to the loop.
fn spawn_transcriber(
    command: &[String],
    generation: u64,
    events: mpsc::Sender<FrontendEvent>,
) -> crate::AkariResult<Child> {
    let mut cmd = build_external_command(command, &[])?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    let mut child = cmd
        .spawn()
        .map_err(|e| crate::AkariError::Process(format!("transcriber spawn failed: {e}")))?;
    let Some(stdout) = child.stdout.take() else {
        kill_process_tree(&mut child);
        return Err(crate::AkariError::Process("transcriber stdout unavailable".to_string()));
    };

    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.split(b'\n') {
            let Ok(bytes) = line else { break };
            let line = String::from_utf8_lossy(&bytes).trim().to_string();
            if events
                .send(FrontendEvent::Transcript { generation, line })
                .is_err()
            {
                return;
            }
        }
        let _ = events.send(FrontendEvent::TranscriberExited { generation });
    });
    Ok(child)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::agent::tests::{model_call, model_text, EchoTools, ScriptedModel};
    use crate::{AkariError, AkariResult};

    type Sent = Rc<RefCell<Vec<(String, String)>>>;

    struct RecordingOutput(Sent);

    impl ChatOutput for RecordingOutput {
        fn send(&mut self, channel_id: &str, text: &str) {
            self.0
                .borrow_mut()
                .push((channel_id.to_string(), text.to_string()));
        }
    }

    struct RecordingVoice(Rc<RefCell<Vec<(String, Option<String>)>>>);

    impl VoiceControl for RecordingVoice {
        fn update_voice_state(&mut self, guild_id: &str, channel_id: Option<&str>) {
            self.0
                .borrow_mut()
                .push((guild_id.to_string(), channel_id.map(str::to_string)));
        }
    }

    struct CountingSynth {
        calls: Rc<RefCell<Vec<(String, f64)>>>,
        fail: bool,
    }

    impl Synthesizer for CountingSynth {
        fn synthesize(&self, text: &str, speed: f64) -> AkariResult<()> {
            self.calls.borrow_mut().push((text.to_string(), speed));
            if self.fail {
                return Err(AkariError::Process("seika down".to_string()));
            }
            Ok(())
        }
    }

    struct FakePlayer {
        playing: Rc<Cell<bool>>,
        plays: Rc<RefCell<Vec<PathBuf>>>,
    }

    impl VoicePlayer for FakePlayer {
        fn play(&mut self, path: &Path) -> AkariResult<()> {
            self.plays.borrow_mut().push(path.to_path_buf());
            self.playing.set(true);
            Ok(())
        }

        fn is_playing(&mut self) -> bool {
            self.playing.get()
        }

        fn stop(&mut self) {
            self.playing.set(false);
        }
    }

    struct Harness {
        frontend: Frontend,
        sent: Sent,
        voice: Rc<RefCell<Vec<(String, Option<String>)>>>,
        synth_calls: Rc<RefCell<Vec<(String, f64)>>>,
        playing: Rc<Cell<bool>>,
        plays: Rc<RefCell<Vec<PathBuf>>>,
        events: mpsc::Receiver<FrontendEvent>,
    }

    impl Harness {
        fn texts(&self) -> Vec<String> {
            self.sent.borrow().iter().map(|(_, t)| t.clone()).collect()
        }

        fn last(&self) -> String {
            self.texts().last().cloned().unwrap_or_default()
        }
    }

    fn harness_with(replies: Vec<crate::Content>, wav: PathBuf, fail_synth: bool) -> Harness {
        let sent: Sent = Rc::new(RefCell::new(Vec::new()));
        let voice = Rc::new(RefCell::new(Vec::new()));
        let synth_calls = Rc::new(RefCell::new(Vec::new()));
        let playing = Rc::new(Cell::new(false));
        let plays = Rc::new(RefCell::new(Vec::new()));
        let (tx, rx) = mpsc::channel();
        let companion = Companion::new(
            Box::new(ScriptedModel::new(replies)),
            Box::new(EchoTools),
            "persona".to_string(),
            10,
            0.7,
        );
        let frontend = Frontend::new(
            companion,
            Box::new(CountingSynth {
                calls: synth_calls.clone(),
                fail: fail_synth,
            }),
            Box::new(FakePlayer {
                playing: playing.clone(),
                plays: plays.clone(),
            }),
            Box::new(RecordingOutput(sent.clone())),
            Box::new(RecordingVoice(voice.clone())),
            FrontendSettings {
                output_wav: wav,
                speech_speed: 1.15,
                transcriber_command: vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    "echo READY; echo ERROR: mic; echo".to_string(),
                ],
            },
            tx,
        );
        Harness {
            frontend,
            sent,
            voice,
            synth_calls,
            playing,
            plays,
            events: rx,
        }
    }

    fn harness(replies: Vec<crate::Content>) -> Harness {
        harness_with(replies, PathBuf::from("output.wav"), false)
    }

    fn put_user_in_voice(h: &mut Harness) {
        h.frontend.handle_event(FrontendEvent::ChannelName {
            channel_id: "vc1".to_string(),
            name: "雑談".to_string(),
        });
        h.frontend.handle_event(FrontendEvent::VoiceState {
            guild_id: "g1".to_string(),
            user_id: "u1".to_string(),
            channel_id: Some("vc1".to_string()),
        });
    }

    fn joined() -> Harness {
        let mut h = harness(Vec::new());
        put_user_in_voice(&mut h);
        h.frontend.handle_command("u1", Some("g1"), "t1", "!join");
        h
    }

    #[test]
    fn join_requires_author_in_voice() {
        let mut h = harness(Vec::new());
        h.frontend.handle_command("u1", Some("g1"), "t1", "!join");
        assert_eq!(h.last(), "VCに入ってからコマンドを実行してね。");
        assert!(h.voice.borrow().is_empty());
        assert!(h.frontend.session().is_none());
    }

    #[test]
    fn join_connects_to_authors_channel() {
        let h = joined();
        assert_eq!(h.last(), "🔊 あかりが `雑談` にログインしたよ！");
        assert_eq!(
            h.voice.borrow()[0],
            ("g1".to_string(), Some("vc1".to_string()))
        );
        assert_eq!(h.frontend.session().unwrap().channel_id, "vc1");
    }

    #[test]
    fn leave_disconnects() {
        let mut h = joined();
        h.frontend.handle_command("u1", Some("g1"), "t1", "!leave");
        assert!(h.frontend.session().is_none());
        assert_eq!(h.voice.borrow()[1], ("g1".to_string(), None));
    }

    #[test]
    fn play_and_say_require_a_session() {
        let mut h = harness(Vec::new());
        h.frontend.handle_command("u1", None, "t1", "!play");
        assert_eq!(h.last(), "VCに入ってないよ。まず `!join` してね。");
        h.frontend.handle_command("u1", None, "t1", "!say -- こんにちは");
        assert_eq!(h.last(), "まず `!join` でVCに入ってね。");
        assert!(h.synth_calls.borrow().is_empty());
    }

    #[test]
    fn say_without_text_warns_and_skips_synthesis() {
        let mut h = joined();
        h.frontend.handle_command("u1", Some("g1"), "t1", "!say -s 1.2 こんにちは");
        assert_eq!(h.last(), "⚠️ 読み上げるテキストがないよ！");
        assert!(h.synth_calls.borrow().is_empty());
        assert!(h.plays.borrow().is_empty());
    }

    #[test]
    fn say_rejects_non_numeric_speed() {
        let mut h = joined();
        h.frontend.handle_command("u1", Some("g1"), "t1", "!say -s はやく -- こんにちは");
        assert_eq!(h.last(), "⚠️ 話速は数値で指定してね！");
        assert!(h.synth_calls.borrow().is_empty());
    }

    #[test]
    fn say_synthesizes_and_plays_when_idle() {
        let mut h = joined();
        h.frontend.handle_command("u1", Some("g1"), "t1", "!say -s 1.3 -- やっほー");
        assert_eq!(h.synth_calls.borrow()[0], ("やっほー".to_string(), 1.3));
        assert_eq!(h.plays.borrow().len(), 1);
    }

    #[test]
    fn play_while_playing_reports_busy() {
        let mut h = joined();
        h.playing.set(true);
        h.frontend.handle_command("u1", Some("g1"), "t1", "!play");
        assert_eq!(h.last(), "⚠️ 現在再生中です。");
        assert!(h.plays.borrow().is_empty());
    }

    #[test]
    fn say_while_playing_reports_busy() {
        let mut h = joined();
        h.playing.set(true);
        h.frontend.handle_command("u1", Some("g1"), "t1", "!say -- やっほー");
        assert_eq!(h.synth_calls.borrow().len(), 1);
        assert_eq!(h.last(), "⚠️ 現在再生中です。");
        assert!(h.plays.borrow().is_empty());
    }

    #[test]
    fn chat_announces_search_and_replies() {
        let mut h = harness(vec![
            model_call("WebSearch", "今日のニュース"),
            model_text("ニュースの要約"),
            model_text("今日はこんなニュースがあったよ！"),
        ]);
        h.frontend.handle_command("u1", None, "t1", "!chat 今日のニュースは？");
        assert_eq!(
            h.texts(),
            vec![
                SEARCH_ANNOUNCEMENT.to_string(),
                "💬 あかり: 今日はこんなニュースがあったよ！".to_string(),
            ]
        );
        assert_eq!(h.synth_calls.borrow()[0].1, 1.15);
        // not connected, so nothing is played
        assert!(h.plays.borrow().is_empty());
    }

    #[test]
    fn synthesis_failure_in_chat_is_an_agent_error() {
        let mut h = harness_with(
            vec![model_text("やあ"), model_text("やっほー")],
            PathBuf::from("output.wav"),
            true,
        );
        h.frontend.handle_command("u1", None, "t1", "!chat こんにちは");
        assert!(h.last().starts_with("❌ エージェントエラー："));
    }

    #[test]
    fn forget_clears_memory() {
        let mut h = harness(vec![model_text("やあ"), model_text("やっほー")]);
        h.frontend.handle_command("u1", None, "t1", "!chat こんにちは");
        assert!(!h.frontend.companion.memory().is_empty());
        h.frontend.handle_command("u1", None, "t1", "!forget");
        assert_eq!(h.last(), "🧠 あかりちゃんの記憶をリセットしたよ。");
        assert!(h.frontend.companion.memory().is_empty());
    }

    #[test]
    fn stop_without_transcriber_warns() {
        let mut h = harness(Vec::new());
        h.frontend.handle_command("u1", None, "t1", "!stop");
        assert_eq!(h.last(), "⚠️ 現在は通話しておりません。");
    }

    #[test]
    fn bot_messages_and_non_commands_are_ignored() {
        let mut h = harness(Vec::new());
        h.frontend.handle_event(FrontendEvent::Message {
            author_id: "b1".to_string(),
            author_is_bot: true,
            guild_id: None,
            channel_id: "t1".to_string(),
            content: "!forget".to_string(),
        });
        h.frontend.handle_command("u1", None, "t1", "こんにちは");
        h.frontend.handle_command("u1", None, "t1", "!unknown");
        assert!(h.texts().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn listen_routes_helper_lines() {
        let mut h = harness(vec![model_text("了解"), model_text("はーい！")]);
        h.frontend.handle_command("u1", None, "t1", "!listen");
        assert!(h.frontend.is_listening());
        h.frontend.handle_command("u1", None, "t1", "!listen");
        assert_eq!(h.last(), "⚠️ すでに通話中です。");

        loop {
            let event = h.events.recv_timeout(Duration::from_secs(5)).unwrap();
            let done = matches!(event, FrontendEvent::TranscriberExited { .. });
            h.frontend.handle_event(event);
            if done {
                break;
            }
        }
        let texts = h.texts();
        assert_eq!(texts[0], "🎤 通話モードを開始します… お待ちください");
        assert!(texts.contains(&"✅ モデルの初期化が完了しました！話しかけてみてね。".to_string()));
        assert!(texts.contains(&"⚠️ 音声認識でエラーが発生しました: `ERROR: mic`".to_string()));
        assert!(!h.frontend.is_listening());
    }

    #[cfg(unix)]
    #[test]
    fn transcript_text_is_echoed_and_chatted() {
        let mut h = harness(vec![model_text("了解"), model_text("はーい！")]);
        h.frontend.transcriber = Some(Transcriber {
            child: sleeper(),
            generation: 7,
            channel_id: "t9".to_string(),
        });
        h.frontend.handle_event(FrontendEvent::Transcript {
            generation: 7,
            line: "明日の予定は？".to_string(),
        });
        h.frontend.handle_event(FrontendEvent::Transcript {
            generation: 3,
            line: "stale".to_string(),
        });
        assert_eq!(
            *h.sent.borrow(),
            vec![
                ("t9".to_string(), "マスター: 明日の予定は？".to_string()),
                ("t9".to_string(), "💬 あかり: はーい！".to_string()),
            ]
        );
        h.frontend.handle_command("u1", None, "t9", "!stop");
        assert_eq!(h.last(), "🛑 通話モードを停止しました。");
        assert!(!h.frontend.is_listening());
    }

    #[cfg(unix)]
    fn sleeper() -> Child {
        let mut cmd = build_external_command(
            &["sh".to_string(), "-c".to_string(), "sleep 30".to_string()],
            &[],
        )
        .unwrap();
        cmd.spawn().unwrap()
    }

    #[test]
    fn monitor_plays_rewritten_wav_only_when_connected_and_idle() {
        let wav = std::env::temp_dir().join(format!("akari-monitor-{}.wav", std::process::id()));
        std::fs::write(&wav, b"RIFF").unwrap();
        let mut h = harness_with(Vec::new(), wav.clone(), false);

        h.frontend.check_output_wav();
        assert!(h.plays.borrow().is_empty());

        put_user_in_voice(&mut h);
        h.frontend.handle_command("u1", Some("g1"), "t1", "!join");
        h.frontend.latest_mtime = Some(SystemTime::UNIX_EPOCH);
        h.frontend.check_output_wav();
        assert_eq!(h.plays.borrow().len(), 1);

        h.frontend.check_output_wav();
        assert_eq!(h.plays.borrow().len(), 1);
        let _ = std::fs::remove_file(&wav);
    }
}
