//! REST remote log.
//!
//! Talks to a PostgREST-style endpoint that exposes the change-log table at
//! `<base>/rest/v1/<table>`. The HTTP client is abstracted so the engine
//! does not depend on a particular HTTP library.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteLog;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use stockpile_sync_protocol::{timestamp, RemoteLogEntry};

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only when no response was received
/// (connection refused, timeout, DNS failure); HTTP error statuses are
/// returned as responses.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body.
    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<HttpResponse, String>;
}

/// Remote log backed by a REST table.
pub struct RestRemoteLog<C: HttpClient> {
    base_url: String,
    api_key: String,
    table: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> RestRemoteLog<C> {
    /// Creates a REST remote log.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
        client: C,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn headers(&self, extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut headers = vec![
            ("apikey".to_string(), self.api_key.clone()),
            ("Authorization".to_string(), format!("Bearer {}", self.api_key)),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        headers.extend(extra.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));
        headers
    }

    fn check(&self, result: Result<HttpResponse, String>) -> SyncResult<HttpResponse> {
        let outcome = match result {
            Err(e) => Err(SyncError::remote_retryable(e)),
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => {
                let message = format!(
                    "HTTP {}: {}",
                    response.status,
                    String::from_utf8_lossy(&response.body)
                );
                if response.status >= 500 || response.status == 408 || response.status == 429 {
                    Err(SyncError::remote_retryable(message))
                } else {
                    Err(SyncError::remote_fatal(message))
                }
            }
        };
        *self.last_error.write() = outcome.as_ref().err().map(ToString::to_string);
        outcome
    }
}

impl<C: HttpClient> RemoteLog for RestRemoteLog<C> {
    fn upsert(&self, entry: &RemoteLogEntry) -> SyncResult<()> {
        let body = serde_json::to_vec(&[entry])
            .map_err(|e| SyncError::remote_fatal(format!("cannot encode entry: {e}")))?;
        let url = format!("{}?on_conflict=id", self.table_url());
        let headers = self.headers(&[
            ("Prefer", "resolution=merge-duplicates,return=minimal"),
        ]);
        self.check(self.client.post(&url, &headers, body))?;
        Ok(())
    }

    fn fetch_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        exclude_device: &str,
    ) -> SyncResult<Vec<RemoteLogEntry>> {
        let mut url = format!(
            "{}?select=*&device_id=neq.{}&synced=eq.true&order=timestamp.asc",
            self.table_url(),
            urlencoding::encode(exclude_device)
        );
        if let Some(w) = watermark {
            url.push_str("&timestamp=gt.");
            url.push_str(&urlencoding::encode(&timestamp::format(w)));
        }
        let response = self.check(self.client.get(&url, &self.headers(&[])))?;
        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::remote_fatal(format!("cannot decode remote entries: {e}")))
    }
}

impl<C: HttpClient> std::fmt::Debug for RestRemoteLog<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRemoteLog")
            .field("base_url", &self.base_url)
            .field("table", &self.table)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
