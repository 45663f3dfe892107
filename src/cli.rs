use clap::{Parser, Subcommand};

use crate::DEFAULT_SPEECH_SPEED;

#[derive(Parser)]
#[command(name = "akari")]
#[command(about = "Japanese voice and chat companion for Discord", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the Discord bot.
    Bot,

    /// One agent turn in the terminal (agent, then refiner).
    Chat {
        /// Message from the master.
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// List the tools the agent can call.
    Tools,

    /// Run a single tool adapter directly.
    Tool {
        /// Tool name, e.g. WeatherForecast
        name: String,
        /// Raw tool input.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        input: Vec<String>,
    },

    /// Synthesize speech into the output WAV.
    Say {
        /// Speaking rate.
        #[arg(short, long, default_value_t = DEFAULT_SPEECH_SPEED)]
        speed: f64,
        /// Text to read aloud.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Live transcription helper: prints READY, then one line per utterance.
    Transcribe {
        /// Input device index (see --list-devices).
        #[arg(long)]
        device: Option<usize>,
        /// Read 16 kHz mono s16le PCM from stdin.
        #[arg(long)]
        stdin: bool,
        /// Print input devices and exit.
        #[arg(long)]
        list_devices: bool,
    },

    /// Authorize a Google account (calendar-reader, calendar-writer, tasks).
    Oauth {
        account: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn say_takes_speed_then_free_text() {
        let cli = Cli::try_parse_from(["akari", "say", "-s", "1.3", "--", "こんにちは", "-マスター"])
            .unwrap();
        match cli.command {
            Command::Say { speed, text } => {
                assert_eq!(speed, 1.3);
                assert_eq!(text, vec!["こんにちは", "-マスター"]);
            }
            _ => panic!("expected say"),
        }
    }

    #[test]
    fn say_defaults_to_reply_speed() {
        let cli = Cli::try_parse_from(["akari", "say", "やっほー"]).unwrap();
        match cli.command {
            Command::Say { speed, .. } => assert_eq!(speed, DEFAULT_SPEECH_SPEED),
            _ => panic!("expected say"),
        }
    }

    #[test]
    fn tool_input_keeps_arrows_and_spaces() {
        let cli = Cli::try_parse_from(["akari", "tool", "GetExchangeRate", "USD→JPY"]).unwrap();
        match cli.command {
            Command::Tool { name, input } => {
                assert_eq!(name, "GetExchangeRate");
                assert_eq!(input.join(" "), "USD→JPY");
            }
            _ => panic!("expected tool"),
        }
    }

    #[test]
    fn chat_requires_a_message() {
        assert!(Cli::try_parse_from(["akari", "chat"]).is_err());
    }
}
