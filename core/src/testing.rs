//! In-memory transport for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport};

#[derive(Default)]
struct Script {
    responses: VecDeque<HttpResponse>,
    requests: Vec<HttpRequest>,
    closed: usize,
}

/// Replays queued responses in order and records every request. Clones share
/// the same script, so a test keeps one handle while the session owns another.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: Value) {
        self.respond_raw(status, &body.to_string());
    }

    pub fn respond_raw(&self, status: u16, body: &str) {
        self.script.borrow_mut().responses.push_back(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.borrow().requests.clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.script
            .borrow()
            .requests
            .last()
            .cloned()
            .expect("no request was sent")
    }

    pub fn last_body(&self) -> Value {
        let body = self.last_request().body.expect("last request has no body");
        serde_json::from_slice(&body).expect("last request body is not JSON")
    }

    pub fn close_count(&self) -> usize {
        self.script.borrow().closed
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut script = self.script.borrow_mut();
        script.requests.push(request);
        script
            .responses
            .pop_front()
            .ok_or_else(|| ApiError::TransportError("no scripted response left".to_string()))
    }

    fn close(&mut self) {
        self.script.borrow_mut().closed += 1;
    }
}
