//! Records and request payloads of the Pinry API.
//!
//! # Design
//! Records are only ever built by decoding a server response. Decoding is
//! all-or-nothing: a missing field, a user link without a numeric id, or an
//! unparseable timestamp rejects the whole record (and any record nesting it).
//!
//! `Pin` and `Board` are editable snapshots. Changing a field only changes
//! the local copy; `PinChanges` and `BoardChanges` are the single place that
//! lists which fields an edit sends back to the service.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

static USER_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A.*/profile/users/(\d+)/\z").expect("user link pattern is valid"));

/// A payload that decoded as JSON but does not describe a valid record.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RecordError(String);

/// Extract the numeric user id from a `.../profile/users/<id>/` link.
pub fn user_id_from_link(link: &str) -> Option<u64> {
    USER_LINK
        .captures(link)
        .and_then(|caps| caps.get(1))
        .and_then(|id| id.as_str().parse().ok())
}

/// Parse a service timestamp. A trailing `Z` is normalized to `+00:00`.
pub fn parse_published(value: &str) -> Option<DateTime<FixedOffset>> {
    let normalized = match value.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => value.to_string(),
    };
    DateTime::parse_from_rfc3339(&normalized).ok()
}

/// Decode a key that must be present but may be `null`.
fn required<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::deserialize(deserializer)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A Pinry account.
///
/// `token` is only present in the authenticated-user response. `gravatar`
/// is missing from the submitter nested in a freshly created pin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawUser")]
pub struct User {
    pub link: String,
    pub id: u64,
    pub username: String,
    pub token: Option<String>,
    pub email: String,
    pub gravatar: Option<String>,
}

#[derive(Deserialize)]
struct RawUser {
    resource_link: String,
    username: String,
    #[serde(default)]
    token: Option<String>,
    email: String,
    #[serde(default)]
    gravatar: Option<String>,
}

impl TryFrom<RawUser> for User {
    type Error = RecordError;

    fn try_from(raw: RawUser) -> Result<Self, Self::Error> {
        let id = user_id_from_link(&raw.resource_link)
            .ok_or_else(|| RecordError(format!("user link has no id: {}", raw.resource_link)))?;
        Ok(Self {
            link: raw.resource_link,
            id,
            username: raw.username,
            token: raw.token,
            email: raw.email,
            gravatar: raw.gravatar,
        })
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.username, self.email)
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// One rendition of an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageVariant {
    #[serde(rename = "image")]
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// An uploaded image and its four renditions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawImage")]
pub struct Image {
    pub id: u64,
    pub original: ImageVariant,
    pub standard: ImageVariant,
    pub thumbnail: ImageVariant,
    pub square: ImageVariant,
}

#[derive(Deserialize)]
struct RawImage {
    id: u64,
    image: String,
    width: u32,
    height: u32,
    standard: ImageVariant,
    thumbnail: ImageVariant,
    square: ImageVariant,
}

impl From<RawImage> for Image {
    fn from(raw: RawImage) -> Self {
        Self {
            id: raw.id,
            original: ImageVariant {
                url: raw.image,
                width: raw.width,
                height: raw.height,
            },
            standard: raw.standard,
            thumbnail: raw.thumbnail,
            square: raw.square,
        }
    }
}

// ---------------------------------------------------------------------------
// Pins
// ---------------------------------------------------------------------------

/// A bookmarked image.
///
/// `private`, `description`, `url`, `source` and `tags` may be edited locally
/// and sent back with `PinryClient::edit_pin`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pin {
    #[serde(rename = "resource_link")]
    pub link: String,
    pub id: u64,
    pub private: bool,
    pub submitter: User,
    #[serde(deserialize_with = "required")]
    pub url: Option<String>,
    #[serde(deserialize_with = "required")]
    pub description: Option<String>,
    #[serde(rename = "referer", deserialize_with = "required")]
    pub source: Option<String>,
    pub image: Image,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Boards
// ---------------------------------------------------------------------------

/// A named collection of pins.
///
/// `name` and `private` may be edited locally and sent back with
/// `PinryClient::edit_board`. `total_pins` is computed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBoard")]
pub struct Board {
    pub link: String,
    pub id: u64,
    pub name: String,
    pub private: bool,
    pub total_pins: u64,
    pub cover: Option<Pin>,
    pub published: DateTime<FixedOffset>,
    pub submitter: User,
}

#[derive(Deserialize)]
struct RawBoard {
    resource_link: String,
    id: u64,
    name: String,
    private: bool,
    total_pins: u64,
    #[serde(deserialize_with = "required")]
    cover: Option<Pin>,
    published: String,
    submitter: User,
}

impl TryFrom<RawBoard> for Board {
    type Error = RecordError;

    fn try_from(raw: RawBoard) -> Result<Self, Self::Error> {
        let published = parse_published(&raw.published)
            .ok_or_else(|| RecordError(format!("invalid board timestamp: {}", raw.published)))?;
        Ok(Self {
            link: raw.resource_link,
            id: raw.id,
            name: raw.name,
            private: raw.private,
            total_pins: raw.total_pins,
            cover: raw.cover,
            published,
            submitter: raw.submitter,
        })
    }
}

// ---------------------------------------------------------------------------
// Pagination envelope
// ---------------------------------------------------------------------------

/// One page of a paginated listing. `next` is `None` on the last page.
///
/// Results default to raw JSON so a page can be inspected even when one of
/// its entries would not decode into a record.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T = serde_json::Value> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(deserialize_with = "required")]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Body of `POST boards/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewBoard {
    pub name: String,
    pub private: bool,
}

/// The editable fields of a board, as sent by `PATCH boards/{id}/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardChanges {
    pub name: String,
    pub private: bool,
}

impl From<&Board> for BoardChanges {
    fn from(board: &Board) -> Self {
        Self {
            name: board.name.clone(),
            private: board.private,
        }
    }
}

/// The editable fields of a pin, as sent by `PATCH pins/{id}/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinChanges {
    pub private: bool,
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "referer")]
    pub source: Option<String>,
    pub tags: Vec<String>,
}

impl From<&Pin> for PinChanges {
    fn from(pin: &Pin) -> Self {
        Self {
            private: pin.private,
            description: pin.description.clone(),
            url: pin.url.clone(),
            source: pin.source.clone(),
            tags: pin.tags.clone(),
        }
    }
}

/// Board membership change, as sent by `PATCH boards/{id}/`.
#[derive(Debug, Clone, Serialize)]
pub struct BoardPins {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pins_to_add: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pins_to_remove: Option<Vec<u64>>,
}

/// Body of `POST pins/`. Exactly one of `image_by_id` and `url` is set.
#[derive(Debug, Clone, Serialize)]
pub struct NewPinPayload {
    pub private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "referer", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_by_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
