//! In-memory stand-in for the Pinry `/api/v2/` surface.
//!
//! Serves the endpoints the client consumes with the same JSON shapes and
//! status codes as the real service: token authentication, limit/offset
//! pagination capped at 50 per page, private records visible only to their
//! submitter, and multipart image uploads.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;

/// Host part of every `resource_link` and pagination link.
pub const LINK_ROOT: &str = "http://localhost/api/v2/";

/// Page size used when a listing names none, and the cap on `limit`.
pub const PAGE_LIMIT: usize = 50;

/// An account seeded into the store.
#[derive(Clone, Debug)]
pub struct Account {
    pub username: String,
    pub email: String,
    pub token: String,
}

impl Account {
    pub fn new(username: &str, token: &str) -> Self {
        Self {
            username: username.to_string(),
            email: format!("{username}@example.org"),
            token: token.to_string(),
        }
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new("yizmeng", "secret-token")
    }
}

struct UserRow {
    id: u64,
    username: String,
    email: String,
    token: String,
}

struct ImageRow {
    id: u64,
    path: String,
    width: u32,
    height: u32,
}

struct PinRow {
    id: u64,
    submitter: u64,
    private: bool,
    url: Option<String>,
    description: Option<String>,
    referer: Option<String>,
    image: u64,
    tags: Vec<String>,
}

struct BoardRow {
    id: u64,
    submitter: u64,
    name: String,
    private: bool,
    published: String,
    pins: Vec<u64>,
}

#[derive(Default)]
pub struct Store {
    users: Vec<UserRow>,
    images: BTreeMap<u64, ImageRow>,
    pins: BTreeMap<u64, PinRow>,
    boards: BTreeMap<u64, BoardRow>,
    next_id: u64,
}

impl Store {
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        let mut store = Store::default();
        for account in accounts {
            let id = store.allocate_id();
            store.users.push(UserRow {
                id,
                username: account.username,
                email: account.email,
                token: account.token,
            });
        }
        store
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: u64) -> &UserRow {
        self.users
            .iter()
            .find(|user| user.id == id)
            .expect("rows only reference seeded users")
    }

    fn user_id(&self, username: &str) -> Option<u64> {
        self.users.iter().find(|user| user.username == username).map(|user| user.id)
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<u64, Failure> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Token "))
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Authentication credentials were not provided."))?;
        self.users
            .iter()
            .find(|user| user.token == token)
            .map(|user| user.id)
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Invalid token."))
    }

    fn visible_pin(&self, id: u64, caller: u64) -> Result<&PinRow, Failure> {
        self.pins
            .get(&id)
            .filter(|pin| !pin.private || pin.submitter == caller)
            .ok_or_else(not_found)
    }

    fn visible_board(&self, id: u64, caller: u64) -> Result<&BoardRow, Failure> {
        self.boards
            .get(&id)
            .filter(|board| !board.private || board.submitter == caller)
            .ok_or_else(not_found)
    }

    // -- rendering ----------------------------------------------------------

    fn user_json(&self, id: u64, with_token: bool, with_gravatar: bool) -> Value {
        let user = self.user(id);
        let mut data = json!({
            "username": user.username,
            "email": user.email,
            "resource_link": format!("{LINK_ROOT}profile/users/{}/", user.id),
        });
        if with_gravatar {
            data["gravatar"] = json!(format!("{:032x}", user.id));
        }
        if with_token {
            data["token"] = json!(user.token);
        }
        data
    }

    fn image_json(&self, id: u64) -> Value {
        let image = &self.images[&id];
        let rendition = |kind: &str, width: u32, height: u32| {
            json!({
                "image": format!("/media/{kind}/{}", image.path),
                "width": width,
                "height": height,
            })
        };
        let (std_w, std_h) = fit(image.width, image.height, 600);
        let (thm_w, thm_h) = fit(image.width, image.height, 240);
        json!({
            "id": image.id,
            "image": format!("/media/original/{}", image.path),
            "width": image.width,
            "height": image.height,
            "standard": rendition("standard", std_w, std_h),
            "thumbnail": rendition("thumbnail", thm_w, thm_h),
            "square": rendition("square", 240, 240),
        })
    }

    fn pin_json(&self, pin: &PinRow, with_gravatar: bool) -> Value {
        json!({
            "id": pin.id,
            "resource_link": format!("{LINK_ROOT}pins/{}/", pin.id),
            "submitter": self.user_json(pin.submitter, false, with_gravatar),
            "url": pin.url,
            "description": pin.description,
            "referer": pin.referer,
            "image": self.image_json(pin.image),
            "private": pin.private,
            "tags": pin.tags,
        })
    }

    fn board_json(&self, board: &BoardRow) -> Value {
        let cover = board
            .pins
            .iter()
            .rev()
            .find_map(|id| self.pins.get(id))
            .map(|pin| self.pin_json(pin, true))
            .unwrap_or(Value::Null);
        json!({
            "id": board.id,
            "resource_link": format!("{LINK_ROOT}boards/{}/", board.id),
            "name": board.name,
            "private": board.private,
            "total_pins": board.pins.len(),
            "cover": cover,
            "published": board.published,
            "submitter": self.user_json(board.submitter, false, true),
        })
    }
}

/// Scale `(width, height)` down so the width does not exceed `max_width`.
fn fit(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let scaled = (u64::from(height) * u64::from(max_width) / u64::from(width)) as u32;
    (max_width, scaled)
}

/// Width and height from a PNG header, when the upload is a PNG.
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || &data[..8] != b"\x89PNG\r\n\x1a\n" || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some((width, height))
}

type Failure = (StatusCode, Json<Value>);
type Reply = Result<Response, Failure>;

fn failure(status: StatusCode, detail: &str) -> Failure {
    (status, Json(json!({ "detail": detail })))
}

fn not_found() -> Failure {
    failure(StatusCode::NOT_FOUND, "Not found.")
}

fn bad_request(detail: &str) -> Failure {
    failure(StatusCode::BAD_REQUEST, detail)
}

fn ok(value: Value) -> Reply {
    Ok(Json(value).into_response())
}

fn created(value: Value) -> Reply {
    Ok((StatusCode::CREATED, Json(value)).into_response())
}

fn no_content() -> Reply {
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Slice `items` into a `{count, next, previous, results}` envelope.
fn paginate(items: Vec<Value>, endpoint: &str, limit: Option<usize>, offset: Option<usize>) -> Value {
    let limit = limit.unwrap_or(PAGE_LIMIT).clamp(1, PAGE_LIMIT);
    let offset = offset.unwrap_or(0);
    let count = items.len();
    let next = (offset + limit < count)
        .then(|| format!("{LINK_ROOT}{endpoint}?limit={limit}&offset={}", offset + limit));
    let previous = (offset > 0).then(|| {
        format!(
            "{LINK_ROOT}{endpoint}?limit={limit}&offset={}",
            offset.saturating_sub(limit)
        )
    });
    let results: Vec<Value> = items.into_iter().skip(offset).take(limit).collect();
    json!({
        "count": count,
        "next": next,
        "previous": previous,
        "results": results,
    })
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with_accounts(vec![Account::default()])
}

pub fn app_with_accounts(accounts: Vec<Account>) -> Router {
    let db: Db = Arc::new(RwLock::new(Store::with_accounts(accounts)));
    let api = Router::new()
        .route("/profile/public-users/", get(public_users))
        .route("/profile/users/", get(current_user))
        .route("/boards-auto-complete/", get(boards_auto_complete))
        .route("/boards/", get(list_boards).post(create_board))
        .route("/boards/{id}/", get(get_board).patch(edit_board).delete(delete_board))
        .route("/pins/", get(list_pins).post(create_pin))
        .route("/pins/{id}/", get(get_pin).patch(edit_pin).delete(delete_pin))
        .route("/images", post(create_image))
        .route("/tags-auto-complete/", get(tags_auto_complete));
    Router::new().nest("/api/v2", api).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_accounts(listener: TcpListener, accounts: Vec<Account>) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_accounts(accounts)).await
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UserParams {
    username: Option<String>,
}

async fn public_users(State(db): State<Db>, headers: HeaderMap, Query(params): Query<UserParams>) -> Reply {
    let store = db.read().await;
    store.authenticate(&headers)?;
    let users: Vec<Value> = store
        .users
        .iter()
        .filter(|user| params.username.as_deref().is_none_or(|name| user.username == name))
        .map(|user| store.user_json(user.id, false, true))
        .collect();
    ok(json!(users))
}

async fn current_user(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let store = db.read().await;
    let caller = store.authenticate(&headers)?;
    ok(json!([store.user_json(caller, true, true)]))
}

// ---------------------------------------------------------------------------
// Boards
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BoardParams {
    search: Option<String>,
    #[serde(rename = "submitter__username")]
    submitter_username: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
struct NewBoard {
    name: String,
    #[serde(default)]
    private: bool,
}

#[derive(Deserialize)]
struct BoardPatch {
    name: Option<String>,
    private: Option<bool>,
    pins_to_add: Option<Vec<u64>>,
    pins_to_remove: Option<Vec<u64>>,
}

async fn boards_auto_complete(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<BoardParams>,
) -> Reply {
    let store = db.read().await;
    let caller = store.authenticate(&headers)?;
    let submitter = params.submitter_username.as_deref().map(|name| store.user_id(name));
    let boards: Vec<Value> = store
        .boards
        .values()
        .filter(|board| !board.private || board.submitter == caller)
        .filter(|board| submitter.is_none_or(|id| id == Some(board.submitter)))
        .map(|board| {
            json!({
                "id": board.id,
                "name": board.name,
                "submitter": store.user_json(board.submitter, false, true),
            })
        })
        .collect();
    ok(json!(boards))
}

async fn list_boards(State(db): State<Db>, headers: HeaderMap, Query(params): Query<BoardParams>) -> Reply {
    let store = db.read().await;
    let caller = store.authenticate(&headers)?;
    let search = params.search.as_deref().map(str::to_lowercase);
    let submitter = params.submitter_username.as_deref().map(|name| store.user_id(name));
    let boards: Vec<Value> = store
        .boards
        .values()
        .filter(|board| !board.private || board.submitter == caller)
        .filter(|board| submitter.is_none_or(|id| id == Some(board.submitter)))
        .filter(|board| {
            search
                .as_deref()
                .is_none_or(|term| board.name.to_lowercase().contains(term))
        })
        .map(|board| store.board_json(board))
        .collect();
    ok(paginate(boards, "boards/", params.limit, params.offset))
}

async fn create_board(State(db): State<Db>, headers: HeaderMap, Json(input): Json<NewBoard>) -> Reply {
    let mut store = db.write().await;
    let caller = store.authenticate(&headers)?;
    if input.name.trim().is_empty() {
        return Err(bad_request("name may not be blank."));
    }
    let id = store.allocate_id();
    store.boards.insert(
        id,
        BoardRow {
            id,
            submitter: caller,
            name: input.name,
            private: input.private,
            published: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            pins: Vec::new(),
        },
    );
    info!(board = id, "board created");
    created(store.board_json(&store.boards[&id]))
}

async fn get_board(State(db): State<Db>, headers: HeaderMap, Path(id): Path<u64>) -> Reply {
    let store = db.read().await;
    let caller = store.authenticate(&headers)?;
    let board = store.visible_board(id, caller)?;
    ok(store.board_json(board))
}

async fn edit_board(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(patch): Json<BoardPatch>,
) -> Reply {
    let mut store = db.write().await;
    let caller = store.authenticate(&headers)?;
    if store.visible_board(id, caller)?.submitter != caller {
        return Err(failure(StatusCode::FORBIDDEN, "You do not own this board."));
    }
    let to_add = patch.pins_to_add.unwrap_or_default();
    if let Some(missing) = to_add.iter().find(|pin| !store.pins.contains_key(*pin)) {
        return Err(bad_request(&format!("pin {missing} does not exist.")));
    }

    let board = store.boards.get_mut(&id).ok_or_else(not_found)?;
    if let Some(name) = patch.name {
        board.name = name;
    }
    if let Some(private) = patch.private {
        board.private = private;
    }
    for pin in to_add {
        if !board.pins.contains(&pin) {
            board.pins.push(pin);
        }
    }
    if let Some(to_remove) = patch.pins_to_remove {
        board.pins.retain(|pin| !to_remove.contains(pin));
    }
    ok(store.board_json(&store.boards[&id]))
}

async fn delete_board(State(db): State<Db>, headers: HeaderMap, Path(id): Path<u64>) -> Reply {
    let mut store = db.write().await;
    let caller = store.authenticate(&headers)?;
    if store.visible_board(id, caller)?.submitter != caller {
        return Err(failure(StatusCode::FORBIDDEN, "You do not own this board."));
    }
    store.boards.remove(&id);
    info!(board = id, "board deleted");
    no_content()
}

// ---------------------------------------------------------------------------
// Pins
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PinParams {
    #[serde(rename = "pins__id")]
    board: Option<u64>,
    #[serde(rename = "submitter__username")]
    submitter_username: Option<String>,
    #[serde(rename = "tags__name")]
    tag: Option<String>,
    ordering: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
struct NewPin {
    #[serde(default)]
    private: bool,
    description: Option<String>,
    referer: Option<String>,
    tags: Option<Vec<String>>,
    image_by_id: Option<u64>,
    url: Option<String>,
}

async fn list_pins(State(db): State<Db>, headers: HeaderMap, Query(params): Query<PinParams>) -> Reply {
    let store = db.read().await;
    let caller = store.authenticate(&headers)?;
    let board_pins = match params.board {
        Some(board) => Some(&store.visible_board(board, caller)?.pins),
        None => None,
    };
    let submitter = params.submitter_username.as_deref().map(|name| store.user_id(name));

    let mut pins: Vec<&PinRow> = store
        .pins
        .values()
        .filter(|pin| !pin.private || pin.submitter == caller)
        .filter(|pin| board_pins.is_none_or(|ids| ids.contains(&pin.id)))
        .filter(|pin| submitter.is_none_or(|id| id == Some(pin.submitter)))
        .filter(|pin| {
            params
                .tag
                .as_deref()
                .is_none_or(|tag| pin.tags.iter().any(|t| t == tag))
        })
        .collect();
    match params.ordering.as_deref().unwrap_or("-id") {
        "id" => {}
        "-id" => pins.reverse(),
        other => return Err(bad_request(&format!("unknown ordering: {other}"))),
    }

    let pins: Vec<Value> = pins.into_iter().map(|pin| store.pin_json(pin, true)).collect();
    ok(paginate(pins, "pins/", params.limit, params.offset))
}

async fn create_pin(State(db): State<Db>, headers: HeaderMap, Json(input): Json<NewPin>) -> Reply {
    let mut store = db.write().await;
    let caller = store.authenticate(&headers)?;

    let image = match (input.image_by_id, &input.url) {
        (Some(image), _) if store.images.contains_key(&image) => image,
        (Some(image), _) => return Err(bad_request(&format!("image {image} does not exist."))),
        (None, Some(url)) => {
            let id = store.allocate_id();
            let name = url.rsplit('/').next().unwrap_or("remote").to_string();
            store.images.insert(
                id,
                ImageRow {
                    id,
                    path: format!("{id}/{name}"),
                    width: 0,
                    height: 0,
                },
            );
            id
        }
        (None, None) => return Err(bad_request("either url or image_by_id is required.")),
    };

    let id = store.allocate_id();
    store.pins.insert(
        id,
        PinRow {
            id,
            submitter: caller,
            private: input.private,
            url: input.url,
            description: input.description,
            referer: input.referer,
            image,
            tags: input.tags.unwrap_or_default(),
        },
    );
    info!(pin = id, image, "pin created");
    // The service leaves the submitter's gravatar out of a freshly created pin.
    created(store.pin_json(&store.pins[&id], false))
}

async fn get_pin(State(db): State<Db>, headers: HeaderMap, Path(id): Path<u64>) -> Reply {
    let store = db.read().await;
    let caller = store.authenticate(&headers)?;
    let pin = store.visible_pin(id, caller)?;
    ok(store.pin_json(pin, true))
}

async fn edit_pin(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(patch): Json<Map<String, Value>>,
) -> Reply {
    let mut store = db.write().await;
    let caller = store.authenticate(&headers)?;
    if store.visible_pin(id, caller)?.submitter != caller {
        return Err(failure(StatusCode::FORBIDDEN, "You do not own this pin."));
    }
    let pin = store.pins.get_mut(&id).ok_or_else(not_found)?;

    let text = |value: &Value| -> Result<Option<String>, Failure> {
        match value {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text.clone())),
            _ => Err(bad_request("expected a string or null.")),
        }
    };
    for (key, value) in &patch {
        match key.as_str() {
            "private" => pin.private = value.as_bool().ok_or_else(|| bad_request("private must be a boolean."))?,
            "description" => pin.description = text(value)?,
            "url" => pin.url = text(value)?,
            "referer" => pin.referer = text(value)?,
            "tags" => {
                pin.tags = serde_json::from_value(value.clone())
                    .map_err(|_| bad_request("tags must be a list of strings."))?
            }
            _ => {}
        }
    }
    ok(store.pin_json(&store.pins[&id], true))
}

async fn delete_pin(State(db): State<Db>, headers: HeaderMap, Path(id): Path<u64>) -> Reply {
    let mut store = db.write().await;
    let caller = store.authenticate(&headers)?;
    if store.visible_pin(id, caller)?.submitter != caller {
        return Err(failure(StatusCode::FORBIDDEN, "You do not own this pin."));
    }
    store.pins.remove(&id);
    for board in store.boards.values_mut() {
        board.pins.retain(|pin| *pin != id);
    }
    info!(pin = id, "pin deleted");
    no_content()
}

// ---------------------------------------------------------------------------
// Images and tags
// ---------------------------------------------------------------------------

async fn create_image(State(db): State<Db>, headers: HeaderMap, mut multipart: Multipart) -> Reply {
    db.read().await.authenticate(&headers)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&e.to_string()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let data = field.bytes().await.map_err(|e| bad_request(&e.to_string()))?;
        upload = Some((filename, data));
    }
    let (filename, data) = upload.ok_or_else(|| bad_request("image is required."))?;
    if data.is_empty() {
        return Err(bad_request("The submitted file is empty."));
    }
    let (width, height) = png_dimensions(&data).unwrap_or((0, 0));

    let mut store = db.write().await;
    let id = store.allocate_id();
    store.images.insert(
        id,
        ImageRow {
            id,
            path: format!("{id}/{filename}"),
            width,
            height,
        },
    );
    info!(image = id, size = data.len(), "image uploaded");
    created(store.image_json(id))
}

async fn tags_auto_complete(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let store = db.read().await;
    store.authenticate(&headers)?;
    let tags: BTreeSet<&str> = store
        .pins
        .values()
        .flat_map(|pin| pin.tags.iter().map(String::as_str))
        .collect();
    let tags: Vec<Value> = tags.into_iter().map(|name| json!({ "name": name })).collect();
    ok(json!(tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_scales_wide_images() {
        assert_eq!(fit(1200, 800, 600), (600, 400));
        assert_eq!(fit(300, 200, 600), (300, 200));
        assert_eq!(fit(0, 0, 240), (0, 0));
    }

    #[test]
    fn png_dimensions_read_ihdr() {
        let mut data = b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR".to_vec();
        data.extend_from_slice(&640u32.to_be_bytes());
        data.extend_from_slice(&480u32.to_be_bytes());
        assert_eq!(png_dimensions(&data), Some((640, 480)));
        assert_eq!(png_dimensions(b"GIF89a"), None);
    }

    #[test]
    fn paginate_links_next_page() {
        let items: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        let page = paginate(items.clone(), "pins/", Some(2), Some(2));
        assert_eq!(page["count"], 5);
        assert_eq!(page["results"], json!([2, 3]));
        assert_eq!(page["next"], format!("{LINK_ROOT}pins/?limit=2&offset=4"));
        assert_eq!(page["previous"], format!("{LINK_ROOT}pins/?limit=2&offset=0"));

        let last = paginate(items, "pins/", Some(2), Some(4));
        assert_eq!(last["results"], json!([4]));
        assert!(last["next"].is_null());
    }

    #[test]
    fn paginate_caps_limit() {
        let items: Vec<Value> = (0..60).map(|i| json!(i)).collect();
        let page = paginate(items, "boards/", Some(500), None);
        assert_eq!(page["results"].as_array().unwrap().len(), PAGE_LIMIT);
        assert!(page["next"].is_string());
    }

    #[test]
    fn gravatar_can_be_left_out() {
        let store = Store::with_accounts(vec![Account::default()]);
        let with = store.user_json(1, false, true);
        let without = store.user_json(1, true, false);
        assert!(with.get("gravatar").is_some());
        assert!(with.get("token").is_none());
        assert!(without.get("gravatar").is_none());
        assert_eq!(without["token"], "secret-token");
        assert_eq!(with["resource_link"], format!("{LINK_ROOT}profile/users/1/"));
    }
}
