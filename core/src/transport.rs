//! Blocking `ureq` transport.

use tracing::debug;
use ureq::{Agent, RequestBuilder};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

/// Executes requests over a pooled `ureq::Agent`.
///
/// The agent is configured so 4xx/5xx responses come back as data rather
/// than `Err`, leaving status interpretation to the session.
pub struct UreqTransport {
    agent: Option<Agent>,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent: Some(agent) }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, req: HttpRequest) -> Result<HttpResponse, ApiError> {
        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| ApiError::TransportError("session is closed".to_string()))?;

        let result = match (req.method, req.body) {
            (HttpMethod::Get, _) => with_headers(agent.get(&req.url), &req.headers).call(),
            (HttpMethod::Delete, _) => with_headers(agent.delete(&req.url), &req.headers).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(agent.post(&req.url), &req.headers).send(body.as_slice())
            }
            (HttpMethod::Post, None) => with_headers(agent.post(&req.url), &req.headers).send_empty(),
            (HttpMethod::Patch, Some(body)) => {
                with_headers(agent.patch(&req.url), &req.headers).send(body.as_slice())
            }
            (HttpMethod::Patch, None) => with_headers(agent.patch(&req.url), &req.headers).send_empty(),
        };
        let mut response = result.map_err(|e| ApiError::TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::TransportError(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn close(&mut self) {
        if self.agent.take().is_some() {
            debug!("ureq agent released");
        }
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}
