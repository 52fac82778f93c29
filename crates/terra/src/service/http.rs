//! Blocking JSON transport shared by the HTTP service clients

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use terra_core::TerraError;
use tracing::debug;

use super::RemoteResult;
use crate::retry::RemoteError;

const USER_AGENT: &str = concat!("terra-cli/", env!("CARGO_PKG_VERSION"));

/// A base URL plus a client with idle pooling disabled, so every response
/// releases its connection once consumed.
///
/// Paths are given as segments; each segment is percent-encoded on its own,
/// so values such as object names may contain `/`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TerraError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                TerraError::InvalidInput(format!("Invalid service URL '{}'", base_url))
            })?;
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TerraError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    /// The base URL with `segments` appended
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, token: &str, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!(%method, path = url.path(), "HTTP request");
        self.client.request(method, url).bearer_auth(token)
    }

    pub fn get<T: DeserializeOwned>(&self, token: &str, segments: &[&str]) -> RemoteResult<T> {
        read_json(send(self.request(Method::GET, token, segments))?)
    }

    /// GET with query parameters
    pub fn get_query<T, Q>(&self, token: &str, segments: &[&str], query: &Q) -> RemoteResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        read_json(send(self.request(Method::GET, token, segments).query(query))?)
    }

    /// Status code of a GET, without reading the body as JSON
    pub fn get_status<Q: Serialize + ?Sized>(
        &self,
        token: &str,
        segments: &[&str],
        query: &Q,
    ) -> RemoteResult<u16> {
        let response = self
            .request(Method::GET, token, segments)
            .query(query)
            .send()
            .map_err(transport_error)?;
        Ok(response.status().as_u16())
    }

    pub fn post<B, T>(&self, token: &str, segments: &[&str], body: &B) -> RemoteResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        read_json(send(self.request(Method::POST, token, segments).json(body))?)
    }

    /// POST whose response body is ignored
    pub fn post_empty<B: Serialize + ?Sized>(
        &self,
        token: &str,
        segments: &[&str],
        body: &B,
    ) -> RemoteResult<()> {
        drain(send(self.request(Method::POST, token, segments).json(body))?)
    }

    pub fn patch<B, T>(&self, token: &str, segments: &[&str], body: &B) -> RemoteResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        read_json(send(self.request(Method::PATCH, token, segments).json(body))?)
    }

    pub fn put_empty(&self, token: &str, segments: &[&str]) -> RemoteResult<()> {
        drain(send(self.request(Method::PUT, token, segments))?)
    }

    pub fn delete(&self, token: &str, segments: &[&str]) -> RemoteResult<()> {
        drain(send(self.request(Method::DELETE, token, segments))?)
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    match err.status() {
        Some(status) => RemoteError::http(status.as_u16(), err.to_string()),
        None => RemoteError::transport(err.to_string()),
    }
}

fn send(builder: RequestBuilder) -> RemoteResult<Response> {
    let response = builder.send().map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body
    };
    Err(RemoteError::http(status.as_u16(), message))
}

fn read_json<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let status = response.status().as_u16();
    response
        .json()
        .map_err(|e| RemoteError::http(status, format!("Invalid response body: {}", e)))
}

fn drain(response: Response) -> RemoteResult<()> {
    response.bytes().map_err(transport_error)?;
    Ok(())
}
