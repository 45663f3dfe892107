mod browser;
mod calendar;
mod datetime;
mod exchange;
mod google;
mod master;
mod search;
mod tasks;
mod weather;

#[allow(unused_imports)]
pub(crate) use browser::*;
#[allow(unused_imports)]
pub(crate) use calendar::*;
#[allow(unused_imports)]
pub(crate) use datetime::*;
#[allow(unused_imports)]
pub(crate) use exchange::*;
#[allow(unused_imports)]
pub(crate) use google::*;
#[allow(unused_imports)]
pub(crate) use master::*;
#[allow(unused_imports)]
pub(crate) use search::*;
#[allow(unused_imports)]
pub(crate) use tasks::*;
#[allow(unused_imports)]
pub(crate) use weather::*;

use std::time::Duration;

use crate::{AkariConfig, AkariError, AkariResult};

/// Shared state for every adapter: resolved config plus one HTTP agent.
pub(crate) struct ToolContext {
    pub(crate) config: AkariConfig,
    pub(crate) http: ureq::Agent,
}

impl ToolContext {
    pub(crate) fn new(config: AkariConfig) -> Self {
        let timeout = Duration::from_millis(config.http_timeout_ms);
        let http = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent("akari")
            .build();
        Self { config, http }
    }

    /// GET returning JSON. Error statuses whose body is JSON are returned as
    /// data so adapters can report the upstream message.
    pub(crate) fn get_json(&self, url: &str) -> AkariResult<serde_json::Value> {
        match self.http.get(url).call() {
            Ok(resp) => Ok(resp.into_json()?),
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                serde_json::from_str(&body).map_err(|_| AkariError::HttpStatus { status, body })
            }
            Err(err) => Err(err.into()),
        }
    }
}
