use std::io::Cursor;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use reqwest::blocking::{multipart, Client};
use serde_json::Value;

use super::vad::SAMPLE_RATE;
use crate::{AkariError, AkariResult, WhisperConfig};

const UPLOAD_FILE_NAME: &str = "utterance.wav";

/// 16 kHz mono 16-bit PCM, in memory.
pub(crate) fn encode_wav(samples: &[i16]) -> AkariResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// One line per recognised segment; falls back to the whole `text` field.
pub(crate) fn parse_segments(body: &Value) -> Vec<String> {
    if let Some(segments) = body.get("segments").and_then(|v| v.as_array()) {
        return segments
            .iter()
            .filter_map(|s| s.get("text").and_then(|t| t.as_str()))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    body.get("text")
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| vec![t.to_string()])
        .unwrap_or_default()
}

/// Speech-to-text over an OpenAI-compatible `audio/transcriptions` endpoint.
pub(crate) struct WhisperClient {
    http: Client,
    config: WhisperConfig,
}

impl WhisperClient {
    pub(crate) fn new(config: WhisperConfig, timeout_ms: u64) -> AkariResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { http, config })
    }

    pub(crate) fn transcribe(&self, samples: &[i16]) -> AkariResult<Vec<String>> {
        let audio = encode_wav(samples)?;
        let form = multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", "verbose_json")
            .part(
                "file",
                multipart::Part::bytes(audio)
                    .file_name(UPLOAD_FILE_NAME)
                    .mime_str("audio/wav")?,
            );

        let mut request = self.http.post(&self.config.url).multipart(form);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AkariError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        let body: Value = response.json()?;
        Ok(parse_segments(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wav_header_describes_16k_mono() {
        let bytes = encode_wav(&[0, 1000, -1000, 42]).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, 42]);
    }

    #[test]
    fn segments_become_trimmed_lines() {
        let body = json!({
            "text": "ignored",
            "segments": [{"text": " こんにちは "}, {"text": "  "}, {"text": "元気？"}]
        });
        assert_eq!(parse_segments(&body), vec!["こんにちは", "元気？"]);
    }

    #[test]
    fn plain_text_response_is_a_single_line() {
        assert_eq!(parse_segments(&json!({"text": " はい "})), vec!["はい"]);
        assert!(parse_segments(&json!({"text": ""})).is_empty());
    }
}
