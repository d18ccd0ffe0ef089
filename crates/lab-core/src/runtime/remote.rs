//! Ferret worker reached over HTTP.
//!
//! - `POST {path}/` with `{"text": <query>, "params": {...}}` runs a query
//! - `GET {path}/info` reports the worker and engine versions

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE, COOKIE};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::error::{RuntimeError, RuntimeResult};
use super::Runtime;

/// Only the engine version is reported; the worker's own version is ignored.
#[derive(Debug, Deserialize)]
struct RemoteVersion {
    ferret: String,
}

#[derive(Debug, Deserialize)]
struct RemoteInfo {
    version: RemoteVersion,
}

#[derive(Debug, Serialize)]
struct RemoteQuery<'a> {
    text: &'a str,
    params: &'a Map<String, Value>,
}

/// HTTP runtime client.
#[derive(Debug, Clone)]
pub struct Remote {
    url: Url,
    path: String,
    headers: HeaderMap,
    client: reqwest::Client,
}

impl Remote {
    /// Create a client for the worker at `url`.
    ///
    /// Recognised `params`: `headers` and `cookies` (objects of strings) and
    /// `path` (string, base path of the worker API).
    pub fn new(url: &str, params: &Map<String, Value>) -> RuntimeResult<Self> {
        let url = Url::parse(url).map_err(|e| RuntimeError::InvalidConfig(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        if let Some(custom) = params.get("headers") {
            for (name, value) in string_map(custom, "headers")? {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| RuntimeError::InvalidConfig(format!("header {name}: {e}")))?;
                let value = HeaderValue::from_str(&value)
                    .map_err(|e| RuntimeError::InvalidConfig(format!("header {name}: {e}")))?;
                headers.append(name, value);
            }
        }

        if let Some(cookies) = params.get("cookies") {
            let rendered = string_map(cookies, "cookies")?
                .into_iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");

            if !rendered.is_empty() {
                let value = HeaderValue::from_str(&rendered)
                    .map_err(|e| RuntimeError::InvalidConfig(format!("cookies: {e}")))?;
                headers.insert(COOKIE, value);
            }
        }

        let path = match params.get("path") {
            Some(Value::String(path)) => path.clone(),
            Some(_) => {
                return Err(RuntimeError::InvalidConfig(
                    "invalid type of path (expected string)".to_string(),
                ))
            }
            None => url.path().to_string(),
        };

        Ok(Self {
            url,
            path: path.trim_end_matches('/').to_string(),
            headers,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.url.clone();
        url.set_path(&format!("{}{}", self.path, name));
        url
    }

    async fn request(&self, method: Method, endpoint: &str, body: Option<Vec<u8>>) -> RuntimeResult<Vec<u8>> {
        let url = self.endpoint(endpoint);
        debug!(%method, url = %url, "calling remote runtime");

        let mut request = self
            .client
            .request(method, url)
            .headers(self.headers.clone());

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(RuntimeError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body.to_vec())
    }
}

#[async_trait]
impl Runtime for Remote {
    async fn version(&self) -> RuntimeResult<String> {
        let data = self.request(Method::GET, "/info", None).await?;
        let info: RemoteInfo = serde_json::from_slice(&data)?;
        Ok(info.version.ferret)
    }

    async fn run(&self, query: &str, params: &Map<String, Value>) -> RuntimeResult<Vec<u8>> {
        let body = serde_json::to_vec(&RemoteQuery {
            text: query,
            params,
        })?;

        self.request(Method::POST, "/", Some(body)).await
    }
}

fn string_map(value: &Value, what: &str) -> RuntimeResult<Vec<(String, String)>> {
    let Value::Object(entries) = value else {
        return Err(RuntimeError::InvalidConfig(format!(
            "invalid type of {what} (expected map)"
        )));
    };

    entries
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key.clone(), s.clone())),
            _ => Err(RuntimeError::InvalidConfig(format!(
                "invalid value type of {what} entry {key} (expected string)"
            ))),
        })
        .collect()
}
