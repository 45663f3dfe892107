use thiserror::Error;

/// Errors raised by Akari's internal plumbing.
///
/// Tool adapters never surface these; they fold failures into `❌` strings.
#[derive(Error, Debug)]
pub(crate) enum AkariError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Gemini API error {status}: {message}")]
    Gemini { status: u16, message: String },

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Discord error: {0}")]
    Discord(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("process error: {0}")]
    Process(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<ureq::Error> for AkariError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, resp) => AkariError::HttpStatus {
                status,
                body: resp.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => AkariError::Transport(transport.to_string()),
        }
    }
}

impl From<reqwest::Error> for AkariError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AkariError::HttpStatus {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => AkariError::Transport(err.to_string()),
        }
    }
}

impl From<tungstenite::Error> for AkariError {
    fn from(err: tungstenite::Error) -> Self {
        AkariError::Discord(err.to_string())
    }
}

impl From<hound::Error> for AkariError {
    fn from(err: hound::Error) -> Self {
        AkariError::Audio(err.to_string())
    }
}

pub(crate) type AkariResult<T> = Result<T, AkariError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_render_code_and_body() {
        let err = AkariError::HttpStatus {
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 401: unauthorized");
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn read_missing() -> AkariResult<String> {
            Ok(std::fs::read_to_string("/definitely/not/here/akari")?)
        }
        assert!(matches!(read_missing(), Err(AkariError::Io(_))));
    }
}
