//! Authenticated session over a `Transport`.
//!
//! # Design
//! `Session` owns the transport for its whole lifetime and carries the
//! `Authorization: Token <token>` header into every request. Each call is a
//! single blocking round-trip: the path is resolved against the API root,
//! the request is executed, any non-2xx status becomes `ApiError::HttpError`,
//! and the body is decoded as JSON (DELETE returns nothing).
//!
//! The transport is released exactly once, either by an explicit `close` or
//! when the session is dropped, so early returns and `?` propagation release
//! it too.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::endpoint;
use crate::error::ApiError;
use crate::http::{FilePart, HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::transport::UreqTransport;

/// Query string parameters, appended in order.
pub type Query = Vec<(&'static str, String)>;

/// A request body together with its content type.
struct Body {
    content_type: String,
    data: Vec<u8>,
}

pub struct Session<T: Transport = UreqTransport> {
    api_root: Url,
    authorization: String,
    transport: T,
    closed: bool,
}

impl<T: Transport> Session<T> {
    /// Open a session against `service_url`. The API root is resolved once,
    /// here, as `service_url` joined with `/api/v2/`.
    pub fn new(service_url: &str, token: &str, transport: T) -> Result<Self, ApiError> {
        let api_root = endpoint::api_root(service_url)?;
        debug!(api_root = %api_root, "session opened");
        Ok(Self {
            api_root,
            authorization: format!("Token {token}"),
            transport,
            closed: false,
        })
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    /// Describe a request without executing it.
    pub fn build(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<HttpRequest, ApiError> {
        let mut url = endpoint::resolve(&self.api_root, path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(HttpRequest {
            method,
            url: url.into(),
            headers: vec![("authorization".to_string(), self.authorization.clone())],
            body: None,
        })
    }

    pub fn get<R: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<R, ApiError> {
        let response = self.send(HttpMethod::Get, path, query, None)?;
        decode(&response)
    }

    pub fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ApiError> {
        let response = self.send(HttpMethod::Post, path, &[], Some(json_body(body)?))?;
        decode(&response)
    }

    /// POST a single file as `multipart/form-data`.
    pub fn post_multipart<R: DeserializeOwned>(&self, path: &str, part: &FilePart) -> Result<R, ApiError> {
        let (content_type, data) = part.encode();
        let response = self.send(HttpMethod::Post, path, &[], Some(Body { content_type, data }))?;
        decode(&response)
    }

    pub fn patch<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ApiError> {
        let response = self.send(HttpMethod::Patch, path, &[], Some(json_body(body)?))?;
        decode(&response)
    }

    pub fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(HttpMethod::Delete, path, &[], None)?;
        Ok(())
    }

    /// Release the transport. Dropping the session does the same.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.transport.close();
            debug!(api_root = %self.api_root, "session closed");
        }
    }

    fn send(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(&str, String)],
        body: Option<Body>,
    ) -> Result<HttpResponse, ApiError> {
        let mut request = self.build(method, path, query)?;
        if let Some(body) = body {
            request.headers.push(("content-type".to_string(), body.content_type));
            request.body = Some(body.data);
        }

        debug!(%method, url = %request.url, "request");
        let response = self.transport.execute(request)?;
        debug!(%method, path, status = response.status, "response");

        check_status(response)
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.release();
    }
}

fn json_body<B: Serialize>(body: &B) -> Result<Body, ApiError> {
    let data = serde_json::to_vec(body).map_err(|e| ApiError::SerializationError(e.to_string()))?;
    Ok(Body {
        content_type: "application/json".to_string(),
        data,
    })
}

fn decode<R: DeserializeOwned>(response: &HttpResponse) -> Result<R, ApiError> {
    Ok(serde_json::from_str(&response.body)?)
}

/// Map any non-2xx status to `ApiError::HttpError`.
fn check_status(response: HttpResponse) -> Result<HttpResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }
    warn!(status = response.status, "request failed");
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body,
    })
}
