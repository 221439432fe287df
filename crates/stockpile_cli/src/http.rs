//! Blocking HTTP client for the REST remote log.

use std::time::Duration;
use stockpile_sync_engine::{HttpClient, HttpResponse};

/// Request timeout of the remote log client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`HttpClient`] backed by `reqwest`'s blocking client.
///
/// Must be created and dropped outside an async context.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client with [`REQUEST_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("stockpile/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<HttpResponse, String> {
        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

fn with_headers(
    mut request: reqwest::blocking::RequestBuilder,
    headers: &[(String, String)],
) -> reqwest::blocking::RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, String> {
        self.send(with_headers(self.client.get(url), headers))
    }

    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<HttpResponse, String> {
        self.send(with_headers(self.client.post(url), headers).body(body))
    }
}
