//! Typed operations on users, boards, pins, images and tags.
//!
//! # Design
//! `PinryClient` is the only component that talks to the service. It owns
//! one `Session` for its whole lifetime; closing or dropping the client
//! releases the session's connections. Every operation is one or more
//! sequential blocking round-trips, and every failure propagates unchanged.
//!
//! A client is not meant to be shared across threads; give each worker its
//! own client.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{FilePart, Transport};
use crate::pagination::{BoardQuery, ListOptions, Listing, PageSource, PinQuery};
use crate::session::Session;
use crate::transport::UreqTransport;
use crate::types::{
    Board, BoardChanges, BoardPins, Image, NewBoard, NewPinPayload, Page, Pin, PinChanges, User,
};

/// The image a new pin points at.
pub enum PinImage {
    /// An image uploaded earlier, referenced by id.
    Uploaded(Image),
    /// A file on disk, uploaded before the pin is created.
    Path(PathBuf),
    /// A byte stream, uploaded before the pin is created.
    Reader(Box<dyn Read>),
    /// A URL the service fetches by itself.
    Url(String),
}

impl PinImage {
    pub fn uploaded(image: Image) -> Self {
        PinImage::Uploaded(image)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        PinImage::Path(path.into())
    }

    pub fn from_reader(reader: impl Read + 'static) -> Self {
        PinImage::Reader(Box::new(reader))
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        PinImage::Url(url.into())
    }
}

/// Options of `PinryClient::create_pin`.
#[derive(Debug, Clone, Default)]
pub struct NewPin {
    pub private: bool,
    pub description: Option<String>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Board the new pin is added to right after creation.
    pub board: Option<u64>,
}

/// Blocking client for the Pinry REST API.
pub struct PinryClient<T: Transport = UreqTransport> {
    session: Session<T>,
}

impl PinryClient<UreqTransport> {
    /// Connect to the service at `service_url`, authenticating with `token`.
    pub fn new(service_url: &str, token: &str) -> Result<Self, ApiError> {
        Self::with_transport(service_url, token, UreqTransport::new())
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&config.service_url, &config.token)
    }

    /// Build a client from `PINRY_URL` and `PINRY_TOKEN`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_config(&ClientConfig::from_env()?)
    }
}

impl<T: Transport> PinryClient<T> {
    pub fn with_transport(service_url: &str, token: &str, transport: T) -> Result<Self, ApiError> {
        Ok(Self {
            session: Session::new(service_url, token, transport)?,
        })
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Release the underlying connections.
    pub fn close(self) {
        self.session.close();
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Look up a user by name. The returned user carries no token.
    pub fn get_user(&self, username: &str) -> Result<User, ApiError> {
        let users: Vec<User> = self
            .session
            .get("profile/public-users/", &[("username", username.to_string())])?;
        users.into_iter().next().ok_or(ApiError::EmptyResult("user"))
    }

    /// The authenticated user, including its token.
    pub fn get_current_user(&self) -> Result<User, ApiError> {
        let users: Vec<User> = self.session.get("profile/users/", &[])?;
        users.into_iter().next().ok_or(ApiError::EmptyResult("user"))
    }

    // -----------------------------------------------------------------------
    // Boards
    // -----------------------------------------------------------------------

    /// Raw board-name autocomplete payload, optionally for one submitter.
    pub fn get_board_info(&self, username: Option<&str>) -> Result<Value, ApiError> {
        let query: Vec<(&str, String)> = username
            .map(|username| ("submitter__username", username.to_string()))
            .into_iter()
            .collect();
        self.session.get("boards-auto-complete/", &query)
    }

    pub fn get_board(&self, board_id: u64) -> Result<Board, ApiError> {
        self.session.get(&format!("boards/{board_id}/"), &[])
    }

    /// One raw page of board search results.
    pub fn get_boards(&self, query: &BoardQuery, offset: u64, limit: u64) -> Result<Page, ApiError> {
        query.fetch_page(&self.session, offset, limit)
    }

    /// Lazily walk every board matching `query`.
    pub fn list_boards(&self, query: BoardQuery, options: ListOptions) -> Listing<'_, T, BoardQuery, Board> {
        Listing::new(&self.session, query, options)
    }

    pub fn create_board(&self, name: &str, private: bool) -> Result<Board, ApiError> {
        let payload = NewBoard {
            name: name.to_string(),
            private,
        };
        let board: Board = self.session.post("boards/", &payload)?;
        debug!(board = board.id, "board created");
        Ok(board)
    }

    pub fn delete_board(&self, board_id: u64) -> Result<(), ApiError> {
        self.session.delete(&format!("boards/{board_id}/"))
    }

    /// Send the board's `name` and `private` fields; nothing else is sent.
    pub fn edit_board(&self, board: &Board) -> Result<Board, ApiError> {
        self.session
            .patch(&format!("boards/{}/", board.id), &BoardChanges::from(board))
    }

    pub fn add_pins_to_board(&self, pin_ids: &[u64], board_id: u64) -> Result<Board, ApiError> {
        let payload = BoardPins {
            pins_to_add: Some(pin_ids.to_vec()),
            pins_to_remove: None,
        };
        self.session.patch(&format!("boards/{board_id}/"), &payload)
    }

    pub fn remove_pins_from_board(&self, pin_ids: &[u64], board_id: u64) -> Result<Board, ApiError> {
        let payload = BoardPins {
            pins_to_add: None,
            pins_to_remove: Some(pin_ids.to_vec()),
        };
        self.session.patch(&format!("boards/{board_id}/"), &payload)
    }

    // -----------------------------------------------------------------------
    // Pins
    // -----------------------------------------------------------------------

    pub fn get_pin(&self, pin_id: u64) -> Result<Pin, ApiError> {
        self.session.get(&format!("pins/{pin_id}/"), &[])
    }

    /// One raw page of pin search results.
    pub fn get_pins(&self, query: &PinQuery, offset: u64, limit: u64) -> Result<Page, ApiError> {
        query.fetch_page(&self.session, offset, limit)
    }

    /// Lazily walk every pin matching `query`.
    pub fn list_pins(&self, query: PinQuery, options: ListOptions) -> Listing<'_, T, PinQuery, Pin> {
        Listing::new(&self.session, query, options)
    }

    pub fn delete_pin(&self, pin_id: u64) -> Result<(), ApiError> {
        self.session.delete(&format!("pins/{pin_id}/"))
    }

    /// Upload raw image bytes read from `reader`.
    pub fn create_image(&self, mut reader: impl Read) -> Result<Image, ApiError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let filename = sniff_filename(&data);
        self.upload(filename, data)
    }

    /// Upload the image file at `path`.
    pub fn create_image_from_path(&self, path: &Path) -> Result<Image, ApiError> {
        let data = fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_else(|| sniff_filename(&data))
            .to_string();
        self.upload(&filename, data)
    }

    fn upload(&self, filename: &str, data: Vec<u8>) -> Result<Image, ApiError> {
        let size = data.len();
        let image: Image = self
            .session
            .post_multipart("images", &FilePart::new("image", filename, data))?;
        debug!(image = image.id, filename, size, "image uploaded");
        Ok(image)
    }

    /// Create a pin, uploading its image first unless it is already uploaded
    /// or given as a URL. When `options.board` is set, the pin is added to
    /// that board and the board's updated state is returned alongside.
    pub fn create_pin(&self, image: PinImage, options: NewPin) -> Result<(Pin, Option<Board>), ApiError> {
        let mut payload = NewPinPayload {
            private: options.private,
            description: options.description,
            source: options.source,
            tags: options.tags,
            image_by_id: None,
            url: None,
        };
        match image {
            PinImage::Uploaded(image) => payload.image_by_id = Some(image.id),
            PinImage::Path(path) => payload.image_by_id = Some(self.create_image_from_path(&path)?.id),
            PinImage::Reader(reader) => payload.image_by_id = Some(self.create_image(reader)?.id),
            PinImage::Url(url) => payload.url = Some(url),
        }

        let pin: Pin = self.session.post("pins/", &payload)?;
        debug!(pin = pin.id, "pin created");

        let board = match options.board {
            Some(board_id) => Some(self.add_pins_to_board(&[pin.id], board_id)?),
            None => None,
        };
        Ok((pin, board))
    }

    /// Send the pin's editable fields: `private`, `description`, `url`,
    /// `source` and `tags`.
    pub fn edit_pin(&self, pin: &Pin) -> Result<Pin, ApiError> {
        self.session
            .patch(&format!("pins/{}/", pin.id), &PinChanges::from(pin))
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    /// Raw tag autocomplete payload.
    pub fn get_tags_info(&self) -> Result<Value, ApiError> {
        self.session.get("tags-auto-complete/", &[])
    }
}

/// Pick an upload filename whose extension matches the image's magic bytes.
fn sniff_filename(data: &[u8]) -> &'static str {
    match data {
        [0x89, b'P', b'N', b'G', ..] => "image.png",
        [0xFF, 0xD8, 0xFF, ..] => "image.jpg",
        [b'G', b'I', b'F', b'8', ..] => "image.gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image.webp",
        _ => "image",
    }
}
