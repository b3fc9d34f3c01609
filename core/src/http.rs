//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! Requests and responses are plain data. The session builds `HttpRequest`
//! values and interprets `HttpResponse` values; a `Transport` performs the
//! actual I/O in between. Keeping the round-trip behind a trait lets the whole
//! client run against a scripted transport in tests.
//!
//! Bodies are raw bytes because image uploads are `multipart/form-data`
//! rather than JSON.

use std::fmt;

use uuid::Uuid;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `url` is absolute and already carries the query string. `headers` always
/// include the `Authorization` header of the session that built it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one request and hands the response back as data.
///
/// Implementations must return 4xx/5xx responses as `Ok`; status
/// interpretation belongs to the session. `Err` is reserved for requests
/// that produced no response at all.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;

    /// Release the underlying connections. Called once when the owning
    /// session is closed or dropped.
    fn close(&mut self) {}
}

/// A single file field of a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FilePart {
    pub fn new(field: &str, filename: &str, data: Vec<u8>) -> Self {
        Self {
            field: field.to_string(),
            filename: filename.to_string(),
            content_type: "application/octet-stream".to_string(),
            data,
        }
    }

    /// Encode as a one-field `multipart/form-data` body.
    ///
    /// Returns the `Content-Type` header value (carrying the boundary) and
    /// the encoded body.
    pub fn encode(&self) -> (String, Vec<u8>) {
        let boundary = format!("pinry-{}", Uuid::new_v4().simple());

        let mut body = Vec::with_capacity(self.data.len() + 256);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                escape_quoted(&self.field),
                escape_quoted(&self.filename)
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", self.content_type).as_bytes());
        body.extend_from_slice(&self.data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        (format!("multipart/form-data; boundary={boundary}"), body)
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_wraps_file_in_boundary() {
        let part = FilePart::new("image", "cat.png", b"PNGDATA".to_vec());
        let (content_type, body) = part.encode();

        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let body = String::from_utf8(body).unwrap();

        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.contains("Content-Disposition: form-data; name=\"image\"; filename=\"cat.png\"\r\n"));
        assert!(body.contains("\r\n\r\nPNGDATA\r\n"));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn multipart_boundaries_differ_between_bodies() {
        let part = FilePart::new("image", "a.jpg", Vec::new());
        assert_ne!(part.encode().0, part.encode().0);
    }

    #[test]
    fn filename_quotes_are_escaped() {
        let part = FilePart::new("image", "say \"cheese\".jpg", Vec::new());
        let body = String::from_utf8(part.encode().1).unwrap();
        assert!(body.contains("filename=\"say \\\"cheese\\\".jpg\""));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://host/api/v2/pins/".to_string(),
            headers: vec![("Authorization".to_string(), "Token abc".to_string())],
            body: None,
        };
        assert_eq!(req.header("authorization"), Some("Token abc"));
        assert_eq!(req.header("content-type"), None);
    }
}
