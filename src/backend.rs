// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The connection to the hosted backend that provides accounts and the beat
//! table. Without a URL and key the backend is disabled: playback still works,
//! accounts and the beat library do not.

use std::fmt;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::Settings;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// A configured backend.
#[derive(Clone)]
pub struct Connection {
    /// Always ends in a slash so endpoints join under it.
    base: Url,
    api_key: String,
    http: reqwest::Client,
}

impl Connection {
    /// The absolute URL of an endpoint such as `rest/v1/beats`.
    pub fn endpoint(&self, path: &str) -> Url {
        // Joining a relative path onto a base ending in a slash cannot fail.
        self.base
            .join(path.trim_start_matches('/'))
            .unwrap_or_else(|_| self.base.clone())
    }

    /// Starts a request carrying the API key. The bearer token is the user's
    /// access token when there is one, and the API key otherwise.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        access_token: Option<&str>,
    ) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token.unwrap_or(&self.api_key))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base", &self.base.as_str())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum Backend {
    Configured(Connection),
    Disabled,
}

impl Backend {
    /// Creates a backend from a URL and key. Missing either one disables it.
    pub fn new(url: Option<&str>, api_key: Option<&str>) -> Result<Backend, BackendError> {
        let (url, api_key) = match (url, api_key) {
            (Some(url), Some(api_key)) => (url, api_key),
            _ => {
                warn!("Backend URL or API key not configured, accounts and the beat library are disabled");
                return Ok(Backend::Disabled);
            }
        };

        let mut base = Url::parse(url).map_err(|source| BackendError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        info!(url = base.as_str(), "Using backend");
        Ok(Backend::Configured(Connection {
            base,
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }))
    }

    pub fn from_settings(settings: &Settings) -> Result<Backend, BackendError> {
        Backend::new(settings.backend_url(), settings.api_key())
    }

    pub fn connection(&self) -> Option<&Connection> {
        match self {
            Backend::Configured(connection) => Some(connection),
            Backend::Disabled => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Backend::Configured(_))
    }
}

/// Pulls the most useful error text out of a failed response. The backend
/// reports errors under a handful of different keys depending on the service.
pub async fn error_message(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|json| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|key| json.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body
            }
        });

    (status, message)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_disabled_without_key() -> Result<(), BackendError> {
        assert!(!Backend::new(Some("https://example.com"), None)?.is_configured());
        assert!(!Backend::new(None, Some("key"))?.is_configured());
        assert!(Backend::new(None, None)?.connection().is_none());
        Ok(())
    }

    #[test]
    fn test_endpoints() -> Result<(), BackendError> {
        let backend = Backend::new(Some("https://example.com"), Some("key"))?;
        let connection = backend.connection().expect("backend should be configured");
        assert_eq!(
            "https://example.com/rest/v1/beats",
            connection.endpoint("rest/v1/beats").as_str()
        );

        let backend = Backend::new(Some("https://example.com/proxy"), Some("key"))?;
        let connection = backend.connection().expect("backend should be configured");
        assert_eq!(
            "https://example.com/proxy/auth/v1/signup",
            connection.endpoint("/auth/v1/signup").as_str()
        );
        Ok(())
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            Backend::new(Some("not a url"), Some("key")),
            Err(BackendError::InvalidUrl { .. })
        ));
    }
}
