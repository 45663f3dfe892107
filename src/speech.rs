use std::time::Duration;

use crate::{run_command_capture, AkariError, AkariResult};

const SYNTH_TIMEOUT_SECS: u64 = 120;
/// `!say` without `-s` speaks at normal speed; replies use the configured default.
pub(crate) const SAY_COMMAND_SPEED: f64 = 1.0;

/// Turns text into the shared output WAV.
pub(crate) trait Synthesizer {
    fn synthesize(&self, text: &str, speed: f64) -> AkariResult<()>;
}

/// Newlines read as pauses.
pub(crate) fn clean_speech_text(text: &str) -> String {
    text.replace("\r\n", "、").replace('\n', "、")
}

/// Runs the configured synthesis command as `<command> <speed> <text>`.
pub(crate) struct CommandSynthesizer {
    pub(crate) command: Vec<String>,
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(&self, text: &str, speed: f64) -> AkariResult<()> {
        let clean = clean_speech_text(text);
        tracing::info!(speed, text = %clean, "synthesizing speech");
        let out = run_command_capture(
            &self.command,
            &[speed.to_string(), clean],
            None,
            Some(Duration::from_secs(SYNTH_TIMEOUT_SECS)),
        )?;
        if !out.success {
            let detail = if out.stderr.trim().is_empty() { out.stdout } else { out.stderr };
            return Err(AkariError::Process(format!(
                "speech synthesis failed: {}",
                detail.trim()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum SayParse {
    Speak { speed: f64, text: String },
    BadSpeed,
    NoText,
}

/// Shell-style `[-s speed] -- text…`. Words before `--` are options; words
/// after it are the text.
pub(crate) fn parse_say_args(args: &str) -> AkariResult<SayParse> {
    let parsed = shlex::split(args)
        .ok_or_else(|| AkariError::Config("No closing quotation".to_string()))?;
    let (options, text_parts): (&[String], &[String]) =
        match parsed.iter().position(|w| w == "--") {
            Some(idx) => (&parsed[..idx], &parsed[idx + 1..]),
            None => (&parsed[..], &parsed[parsed.len()..]),
        };

    let mut speed = SAY_COMMAND_SPEED;
    let mut i = 0;
    while i < options.len() {
        if matches!(options[i].as_str(), "-s" | "--speed") && i + 1 < options.len() {
            match options[i + 1].parse::<f64>() {
                Ok(value) if value.is_finite() => {
                    speed = value;
                    i += 2;
                }
                _ => return Ok(SayParse::BadSpeed),
            }
        } else {
            i += 1;
        }
    }

    if text_parts.is_empty() {
        return Ok(SayParse::NoText);
    }
    Ok(SayParse::Speak {
        speed,
        text: text_parts.join(" "),
    })
}
