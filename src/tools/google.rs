use serde_json::Value;

use crate::{access_token, AkariError, AkariResult, GoogleAccount, ToolContext};

pub(crate) const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
pub(crate) const TASKS_API: &str = "https://tasks.googleapis.com/tasks/v1";

/// Bearer-authenticated Google REST calls for one account.
pub(crate) struct GoogleApi<'a> {
    http: &'a ureq::Agent,
    token: String,
}

impl<'a> GoogleApi<'a> {
    pub(crate) fn connect(ctx: &'a ToolContext, account: GoogleAccount) -> AkariResult<Self> {
        let token = access_token(account, &ctx.config.credentials_dir)?;
        Ok(Self {
            http: &ctx.http,
            token,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub(crate) fn get(&self, url: &str, query: &[(&str, &str)]) -> AkariResult<Value> {
        let mut request = self.http.get(url).set("Authorization", &self.bearer());
        for (key, value) in query {
            request = request.query(key, value);
        }
        finish(request.call())
    }

    pub(crate) fn post(&self, url: &str, body: &Value) -> AkariResult<Value> {
        let response = self
            .http
            .post(url)
            .set("Authorization", &self.bearer())
            .send_json(body.clone());
        finish(response)
    }

    pub(crate) fn delete(&self, url: &str) -> AkariResult<()> {
        self.http
            .delete(url)
            .set("Authorization", &self.bearer())
            .call()
            .map_err(google_error)?;
        Ok(())
    }
}

fn finish(response: Result<ureq::Response, ureq::Error>) -> AkariResult<Value> {
    let resp = response.map_err(google_error)?;
    Ok(resp.into_json()?)
}

/// Google error bodies carry `error.message`; prefer it over the raw body.
fn google_error(err: ureq::Error) -> AkariError {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(ToString::to_string))
                .unwrap_or(body);
            AkariError::HttpStatus { status, body: message }
        }
        other => other.into(),
    }
}

pub(crate) fn path_segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

pub(crate) fn items(value: &Value) -> Vec<Value> {
    value
        .get("items")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}
