use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fs;
use std::hash::{BuildHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tiny_http::{Response, Server};
use url::form_urlencoded;

use crate::{AkariError, AkariResult};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const EXPIRY_SKEW_SECS: i64 = 60;
const OAUTH_HTTP_TIMEOUT_MS: u64 = 30_000;

/// The separately-consented Google accounts the tools act through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GoogleAccount {
    CalendarReader,
    CalendarWriter,
    Tasks,
}

impl GoogleAccount {
    pub(crate) const ALL: [GoogleAccount; 3] = [
        GoogleAccount::CalendarReader,
        GoogleAccount::CalendarWriter,
        GoogleAccount::Tasks,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            GoogleAccount::CalendarReader => "calendar-reader",
            GoogleAccount::CalendarWriter => "calendar-writer",
            GoogleAccount::Tasks => "tasks",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == value.trim())
    }

    pub(crate) fn scope(self) -> &'static str {
        match self {
            GoogleAccount::CalendarReader => "https://www.googleapis.com/auth/calendar.readonly",
            GoogleAccount::CalendarWriter => "https://www.googleapis.com/auth/calendar",
            GoogleAccount::Tasks => "https://www.googleapis.com/auth/tasks",
        }
    }

    pub(crate) fn client_secret_file(self) -> &'static str {
        match self {
            GoogleAccount::CalendarReader => "client_secret_reader.json",
            GoogleAccount::CalendarWriter | GoogleAccount::Tasks => "client_secret_writer.json",
        }
    }

    pub(crate) fn token_file(self) -> &'static str {
        match self {
            GoogleAccount::CalendarReader => "token_reader.json",
            GoogleAccount::CalendarWriter => "token_writer.json",
            GoogleAccount::Tasks => "token_tasks.json",
        }
    }
}

/// Google's "authorized user" token file layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct AuthorizedUser {
    #[serde(default)]
    pub(crate) token: Option<String>,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    #[serde(default)]
    pub(crate) scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expiry: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl AuthorizedUser {
    pub(crate) fn expiry_time(&self) -> Option<DateTime<Utc>> {
        parse_expiry(self.expiry.as_deref()?)
    }

    /// No token counts as expired. A token without expiry never does.
    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return true;
        }
        match self.expiry_time() {
            Some(expiry) => now + chrono::Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    pub(crate) fn covers_scope(&self, scope: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| s == scope)
    }

    fn apply_token_response(&mut self, response: &serde_json::Value, now: DateTime<Utc>) -> AkariResult<()> {
        let access = response
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AkariError::OAuth("token response missing access_token".to_string()))?;
        self.token = Some(access.to_string());
        if let Some(rt) = response.get("refresh_token").and_then(|v| v.as_str()) {
            self.refresh_token = Some(rt.to_string());
        }
        if let Some(secs) = response.get("expires_in").and_then(|v| v.as_i64()) {
            let expiry = now + chrono::Duration::seconds(secs);
            self.expiry = Some(expiry.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string());
        }
        Ok(())
    }
}

pub(crate) fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSecretFile {
    #[serde(default)]
    installed: Option<ClientSecret>,
    #[serde(default)]
    web: Option<ClientSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ClientSecret {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    #[serde(default)]
    pub(crate) auth_uri: Option<String>,
    #[serde(default)]
    pub(crate) token_uri: Option<String>,
}

pub(crate) fn load_client_secret(path: &Path) -> AkariResult<ClientSecret> {
    let data = fs::read_to_string(path)
        .map_err(|e| AkariError::OAuth(format!("{}: {e}", path.display())))?;
    let file: ClientSecretFile = serde_json::from_str(&data)?;
    file.installed
        .or(file.web)
        .ok_or_else(|| AkariError::OAuth(format!("{}: no installed/web client", path.display())))
}

pub(crate) fn load_authorized_user(path: &Path) -> AkariResult<AuthorizedUser> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

pub(crate) fn save_authorized_user(path: &Path, user: &AuthorizedUser) -> AkariResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(user)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn oauth_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_millis(OAUTH_HTTP_TIMEOUT_MS))
        .timeout_read(Duration::from_millis(OAUTH_HTTP_TIMEOUT_MS))
        .timeout_write(Duration::from_millis(OAUTH_HTTP_TIMEOUT_MS))
        .build()
}

fn post_token_form(token_url: &str, payload: &str) -> AkariResult<serde_json::Value> {
    let response = oauth_agent()
        .post(token_url)
        .set("content-type", "application/x-www-form-urlencoded")
        .send_string(payload);
    match response {
        Ok(resp) => Ok(resp.into_json()?),
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            Err(AkariError::OAuth(format!("token error {code}: {text}")))
        }
        Err(err) => Err(AkariError::OAuth(format!("token request failed: {err}"))),
    }
}

pub(crate) fn refresh_google_token(user: &mut AuthorizedUser) -> AkariResult<()> {
    let refresh_token = user
        .refresh_token
        .clone()
        .ok_or_else(|| AkariError::OAuth("missing refresh_token".to_string()))?;
    let payload = form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", &user.client_id)
        .append_pair("client_secret", &user.client_secret)
        .append_pair("grant_type", "refresh_token")
        .append_pair("refresh_token", &refresh_token)
        .finish();
    let refreshed = post_token_form(&user.token_uri, &payload)?;
    user.apply_token_response(&refreshed, Utc::now())
}

pub(crate) fn build_google_auth_url(
    auth_uri: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
) -> String {
    format!(
        "{auth_uri}?response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline&prompt=consent&state={}",
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(scope),
        urlencoding::encode(state)
    )
}

fn exchange_oauth_code(
    token_url: &str,
    client: &ClientSecret,
    redirect_uri: &str,
    code: &str,
) -> AkariResult<serde_json::Value> {
    let payload = form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", &client.client_id)
        .append_pair("client_secret", &client.client_secret)
        .append_pair("grant_type", "authorization_code")
        .append_pair("code", code)
        .append_pair("redirect_uri", redirect_uri)
        .finish();
    post_token_form(token_url, &payload)
}

/// 128-bit hex `state` for the consent redirect. Each half is the clock,
/// pid and port hashed under a freshly seeded `RandomState`.
pub(crate) fn oauth_state(port: u16) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let half = || {
        let mut hasher = RandomState::new().build_hasher();
        (nanos, std::process::id(), port).hash(&mut hasher);
        hasher.finish()
    };
    format!("{:016x}{:016x}", half(), half())
}

/// Installed-app authorization-code flow on an ephemeral loopback port.
/// Blocks until the browser redirect arrives.
pub(crate) fn run_installed_app_flow(
    account: GoogleAccount,
    client: &ClientSecret,
) -> AkariResult<AuthorizedUser> {
    let server = Server::http("127.0.0.1:0")
        .map_err(|e| AkariError::OAuth(format!("loopback server: {e}")))?;
    let port = server
        .server_addr()
        .to_ip()
        .map(|addr| addr.port())
        .ok_or_else(|| AkariError::OAuth("loopback server has no TCP address".to_string()))?;
    let redirect_uri = format!("http://localhost:{port}/");
    let state = oauth_state(port);
    let auth_uri = client.auth_uri.as_deref().unwrap_or(GOOGLE_AUTH_URL);
    let token_uri = client.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URL);
    let auth_url = build_google_auth_url(auth_uri, &client.client_id, &redirect_uri, account.scope(), &state);

    eprintln!("Open this URL to authorize {}:\n{auth_url}", account.name());
    tracing::info!(account = account.name(), port, "waiting for OAuth redirect");

    for request in server.incoming_requests() {
        let url = request.url().to_string();
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        let params: HashMap<String, String> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        if let Some(err) = params.get("error") {
            let _ = request.respond(Response::from_string("authorization failed"));
            return Err(AkariError::OAuth(format!("authorization denied: {err}")));
        }
        let Some(code) = params.get("code") else {
            let _ = request.respond(Response::from_string("missing code"));
            continue;
        };
        if params.get("state").map(String::as_str) != Some(state.as_str()) {
            let _ = request.respond(Response::from_string("state mismatch"));
            continue;
        }
        let token = exchange_oauth_code(token_uri, client, &redirect_uri, code)?;
        let _ = request.respond(Response::from_string(
            "認証が完了しました。このウィンドウを閉じてください。",
        ));
        let mut user = AuthorizedUser {
            token: None,
            refresh_token: None,
            token_uri: token_uri.to_string(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes: vec![account.scope().to_string()],
            expiry: None,
            extra: serde_json::Map::new(),
        };
        user.apply_token_response(&token, Utc::now())?;
        return Ok(user);
    }
    Err(AkariError::OAuth("loopback server stopped".to_string()))
}

/// Resolves a usable access token for `account`, refreshing or running the
/// consent flow as needed. The token file is rewritten whenever it changes.
pub(crate) fn access_token(account: GoogleAccount, credentials_dir: &Path) -> AkariResult<String> {
    let token_path = token_path(account, credentials_dir);
    let mut user = match load_authorized_user(&token_path) {
        Ok(user) if user.covers_scope(account.scope()) => Some(user),
        Ok(_) => {
            tracing::warn!(account = account.name(), "stored token lacks scope, re-authorizing");
            None
        }
        Err(AkariError::Io(_)) => None,
        Err(err) => {
            tracing::warn!(account = account.name(), error = %err, "unreadable token file");
            None
        }
    };

    if let Some(existing) = user.as_mut() {
        if !existing.is_expired(Utc::now()) {
            if let Some(token) = existing.token.clone() {
                return Ok(token);
            }
        }
        if existing.refresh_token.is_some() {
            match refresh_google_token(existing) {
                Ok(()) => {
                    save_authorized_user(&token_path, existing)?;
                    tracing::debug!(account = account.name(), "refreshed access token");
                    return existing
                        .token
                        .clone()
                        .ok_or_else(|| AkariError::OAuth("refresh returned no token".to_string()));
                }
                Err(err) => {
                    tracing::warn!(account = account.name(), error = %err, "refresh failed, re-authorizing");
                }
            }
        }
    }

    let client = load_client_secret(&credentials_dir.join(account.client_secret_file()))?;
    let fresh = run_installed_app_flow(account, &client)?;
    save_authorized_user(&token_path, &fresh)?;
    fresh
        .token
        .clone()
        .ok_or_else(|| AkariError::OAuth("authorization returned no token".to_string()))
}

pub(crate) fn token_path(account: GoogleAccount, credentials_dir: &Path) -> PathBuf {
    credentials_dir.join(account.token_file())
}
