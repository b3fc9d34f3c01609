//! Blocking client for the Pinry image-bookmarking REST API.
//!
//! # Overview
//! `PinryClient` lists, creates, edits and deletes users' boards and pins,
//! uploads images, and walks paginated searches lazily. Every call is a
//! synchronous round-trip authenticated with `Authorization: Token <token>`.
//!
//! # Design
//! - Requests and responses are plain data (`HttpRequest` / `HttpResponse`);
//!   a `Transport` executes them. `UreqTransport` is the default, tests use
//!   scripted transports or the mock server.
//! - Endpoints are resolved against `<service>/api/v2/` with href semantics
//!   (see `endpoint`).
//! - Records are decoded all-or-nothing from server JSON. `Pin` and `Board`
//!   are editable snapshots; only their whitelisted fields are sent back.
//! - Errors propagate unchanged; nothing is retried.
//!
//! ```no_run
//! use pinry_core::{single, BoardQuery, ListOptions, PinQuery, PinryClient};
//!
//! # fn main() -> pinry_core::Result<()> {
//! let client = PinryClient::new("http://localhost", "token")?;
//! let query = BoardQuery::new().search("among us").username("yizmeng");
//! let board = single(client.list_boards(query, ListOptions::default()))?;
//! for pin in client.list_pins(PinQuery::new().board(&board).ordering("id"), ListOptions::default()) {
//!     let pin = pin?;
//!     println!("pin {}: {:?} ({})", pin.id, pin.description, pin.tags.join(", "));
//! }
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod pagination;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{NewPin, PinImage, PinryClient};
pub use config::ClientConfig;
pub use error::{ApiError, Result};
pub use http::{FilePart, HttpMethod, HttpRequest, HttpResponse, Transport};
pub use pagination::{single, BoardQuery, ListOptions, Listing, PinQuery};
pub use session::Session;
pub use transport::UreqTransport;
pub use types::{Board, BoardChanges, Image, ImageVariant, Page, Pin, PinChanges, User};
