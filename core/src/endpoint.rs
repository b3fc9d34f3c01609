//! Endpoint resolution for the Pinry API.
//!
//! # Design
//! Endpoints are joined the way a browser resolves an `href` against the page
//! it sits on (RFC 3986 reference resolution), not by string concatenation:
//!
//! - a base without a trailing `/` loses its last segment,
//! - a reference starting with `/` restarts at the host root,
//! - a reference starting with `//` replaces the authority as well.
//!
//! The API root is resolved once from the service URL and always keeps its
//! trailing slash, so relative endpoints such as `boards/5/` append to it.

use url::Url;

use crate::error::ApiError;

/// Path of the API root relative to the service URL.
pub const API_ROOT: &str = "/api/v2/";

/// Resolve `reference` against `base` using href semantics.
pub fn resolve(base: &Url, reference: &str) -> Result<Url, ApiError> {
    Ok(base.join(reference)?)
}

/// Parse `base` and resolve `reference` against it.
pub fn resolve_str(base: &str, reference: &str) -> Result<Url, ApiError> {
    resolve(&Url::parse(base)?, reference)
}

/// Compute the API root for a service URL, e.g.
/// `http://host/pinry` becomes `http://host/api/v2/`.
pub fn api_root(service_url: &str) -> Result<Url, ApiError> {
    resolve_str(service_url, API_ROOT)
}
