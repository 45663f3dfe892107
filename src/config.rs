use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    command_spec_to_vec, env_f64, env_optional, env_u64, AkariResult, CalendarLabel, CommandSpec,
    WhisperFileConfig,
};

pub(crate) const DEFAULT_CONFIG_PATH: &str = "akari.json";
pub(crate) const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub(crate) const DEFAULT_TEMPERATURE: f64 = 0.7;
pub(crate) const DEFAULT_MAX_ITERATIONS: usize = 10;
pub(crate) const DEFAULT_SPEECH_SPEED: f64 = 1.15;
pub(crate) const DEFAULT_WHISPER_URL: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
pub(crate) const DEFAULT_WHISPER_MODEL: &str = "whisper-large-v3-turbo";

/// Optional `akari.json`. Every field may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct FileConfig {
    #[serde(default)]
    pub(crate) gemini_model: Option<String>,
    #[serde(default)]
    pub(crate) temperature: Option<f64>,
    #[serde(default)]
    pub(crate) max_iterations: Option<usize>,
    #[serde(default)]
    pub(crate) tts_command: Option<CommandSpec>,
    #[serde(default)]
    pub(crate) player_command: Option<CommandSpec>,
    #[serde(default)]
    pub(crate) browser_agent_command: Option<CommandSpec>,
    #[serde(default)]
    pub(crate) transcriber_command: Option<CommandSpec>,
    #[serde(default)]
    pub(crate) credentials_dir: Option<PathBuf>,
    #[serde(default)]
    pub(crate) prompt_path: Option<PathBuf>,
    #[serde(default)]
    pub(crate) master_profile_path: Option<PathBuf>,
    #[serde(default)]
    pub(crate) output_wav: Option<PathBuf>,
    #[serde(default)]
    pub(crate) speech_speed: Option<f64>,
    #[serde(default)]
    pub(crate) calendar_labels: Option<Vec<CalendarLabel>>,
    #[serde(default)]
    pub(crate) whisper: Option<WhisperFileConfig>,
}

pub(crate) fn load_file_config(path: &Path) -> FileConfig {
    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable config file");
                FileConfig::default()
            }
        },
        Err(_) => FileConfig::default(),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WhisperConfig {
    pub(crate) url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) model: String,
    pub(crate) language: String,
}

/// Resolved runtime configuration: `akari.json` overlaid by the environment.
#[derive(Debug, Clone)]
pub(crate) struct AkariConfig {
    pub(crate) discord_token: Option<String>,
    pub(crate) gemini_api_key: Option<String>,
    pub(crate) gemini_model: String,
    pub(crate) temperature: f64,
    pub(crate) max_iterations: usize,
    pub(crate) openweather_api_key: Option<String>,
    pub(crate) perplexity_api_key: Option<String>,
    pub(crate) tts_command: Vec<String>,
    pub(crate) player_command: Vec<String>,
    pub(crate) browser_agent_command: Option<Vec<String>>,
    pub(crate) transcriber_command: Option<Vec<String>>,
    pub(crate) credentials_dir: PathBuf,
    pub(crate) prompt_path: PathBuf,
    pub(crate) master_profile_path: PathBuf,
    pub(crate) output_wav: PathBuf,
    pub(crate) speech_speed: f64,
    pub(crate) http_timeout_ms: u64,
    pub(crate) calendar_labels: Vec<CalendarLabel>,
    pub(crate) whisper: WhisperConfig,
}

impl AkariConfig {
    pub(crate) fn load() -> AkariResult<Self> {
        let path = env_optional("AKARI_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_file_config(load_file_config(&path))
    }

    pub(crate) fn from_file_config(file: FileConfig) -> AkariResult<Self> {
        let command_from_env = |name: &str| {
            env_optional(name).map(|raw| command_spec_to_vec(&CommandSpec::String(raw)))
        };

        let tts_command = command_from_env("AKARI_TTS_COMMAND")
            .or_else(|| file.tts_command.as_ref().map(command_spec_to_vec))
            .unwrap_or_else(|| vec!["seikasay2.bat".to_string()]);
        let player_command = command_from_env("AKARI_PLAYER_COMMAND")
            .or_else(|| file.player_command.as_ref().map(command_spec_to_vec))
            .unwrap_or_else(default_player_command);
        let browser_agent_command = command_from_env("AKARI_BROWSER_AGENT_COMMAND")
            .or_else(|| file.browser_agent_command.as_ref().map(command_spec_to_vec));
        let transcriber_command = command_from_env("AKARI_TRANSCRIBER_COMMAND")
            .or_else(|| file.transcriber_command.as_ref().map(command_spec_to_vec));

        let whisper_file = file.whisper.clone().unwrap_or(WhisperFileConfig {
            url: None,
            model: None,
            language: None,
        });
        let whisper = WhisperConfig {
            url: env_optional("WHISPER_API_URL")
                .or(whisper_file.url)
                .unwrap_or_else(|| DEFAULT_WHISPER_URL.to_string()),
            api_key: env_optional("WHISPER_API_KEY").or_else(|| env_optional("GROQ_API_KEY")),
            model: env_optional("WHISPER_MODEL")
                .or(whisper_file.model)
                .unwrap_or_else(|| DEFAULT_WHISPER_MODEL.to_string()),
            language: whisper_file.language.unwrap_or_else(|| "ja".to_string()),
        };

        Ok(Self {
            discord_token: env_optional("DISCORD_TOKEN"),
            gemini_api_key: env_optional("GEMINI_API_KEY")
                .or_else(|| env_optional("GOOGLE_API_KEY")),
            gemini_model: env_optional("GEMINI_MODEL")
                .or(file.gemini_model)
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            temperature: env_f64(
                "AKARI_TEMPERATURE",
                file.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            )?,
            max_iterations: file.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS).max(1),
            openweather_api_key: env_optional("OPENWEATHER_API_KEY"),
            perplexity_api_key: env_optional("PERPLEXITY_API_KEY"),
            tts_command,
            player_command,
            browser_agent_command,
            transcriber_command,
            credentials_dir: env_optional("AKARI_CREDENTIALS_DIR")
                .map(PathBuf::from)
                .or(file.credentials_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            prompt_path: file.prompt_path.unwrap_or_else(|| PathBuf::from("prompt.txt")),
            master_profile_path: file
                .master_profile_path
                .unwrap_or_else(|| PathBuf::from("master_profile.txt")),
            output_wav: file.output_wav.unwrap_or_else(|| PathBuf::from("output.wav")),
            speech_speed: file.speech_speed.unwrap_or(DEFAULT_SPEECH_SPEED),
            http_timeout_ms: env_u64("AKARI_HTTP_TIMEOUT_MS", 60_000)?,
            calendar_labels: file.calendar_labels.unwrap_or_else(default_calendar_labels),
            whisper,
        })
    }
}

fn default_player_command() -> Vec<String> {
    ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_calendar_labels() -> Vec<CalendarLabel> {
    vec![CalendarLabel {
        keywords: vec!["あかり".to_string(), "akari".to_string()],
        description: "（あかり専用カレンダー・追加と削除が可能）".to_string(),
    }]
}
