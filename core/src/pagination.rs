//! Lazy listings over paginated endpoints.
//!
//! # Design
//! A `Listing` fetches one page at a time, only when its buffer runs dry, and
//! decodes records one by one as they are consumed. It stops when the page
//! envelope's `next` is null, when a page comes back empty, or once the
//! overall `limit` has been yielded. A listing cannot be rewound: iterating
//! again means building a new one, which starts over from its first offset.
//!
//! The offset advances by the number of results the page actually held, so
//! a server that caps the page size below the requested one never makes the
//! listing skip entries, and an unbounded listing (`limit == 0`) still moves
//! forward on every fetch.

use std::collections::VecDeque;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;
use crate::http::Transport;
use crate::session::{Query, Session};
use crate::types::{Board, Page};

/// Default page size; matches the service's per-page cap.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Bounds of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Offset of the first result.
    pub offset: u64,
    /// Maximum number of records to yield; `0` means no limit.
    pub limit: u64,
    /// Number of results requested per page.
    pub page_size: u64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Search filters for `GET boards/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardQuery {
    /// Free-text match on the board name.
    pub search: Option<String>,
    /// Only boards submitted by this user.
    pub username: Option<String>,
}

impl BoardQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub(crate) fn params(&self, offset: u64, limit: u64) -> Query {
        let mut query: Query = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(search) = &self.search {
            query.push(("search", search.clone()));
        }
        if let Some(username) = &self.username {
            query.push(("submitter__username", username.clone()));
        }
        query
    }
}

/// Search filters for `GET pins/`.
///
/// `ordering` names the sort key; prefix it with `-` for descending order.
/// The service does not reliably honor descending orderings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinQuery {
    /// Only pins on the board with this id.
    pub board: Option<u64>,
    pub username: Option<String>,
    pub tag: Option<String>,
    pub ordering: String,
}

impl Default for PinQuery {
    fn default() -> Self {
        Self {
            board: None,
            username: None,
            tag: None,
            ordering: "-id".to_string(),
        }
    }
}

impl PinQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn board(mut self, board: &Board) -> Self {
        self.board = Some(board.id);
        self
    }

    pub fn board_id(mut self, board_id: u64) -> Self {
        self.board = Some(board_id);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn ordering(mut self, ordering: impl Into<String>) -> Self {
        self.ordering = ordering.into();
        self
    }

    pub(crate) fn params(&self, offset: u64, limit: u64) -> Query {
        let mut query: Query = vec![
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("ordering", self.ordering.clone()),
        ];
        if let Some(board) = self.board {
            query.push(("pins__id", board.to_string()));
        }
        if let Some(username) = &self.username {
            query.push(("submitter__username", username.clone()));
        }
        if let Some(tag) = &self.tag {
            query.push(("tags__name", tag.clone()));
        }
        query
    }
}

/// A paginated endpoint together with its filters.
pub trait PageSource {
    fn fetch_page<T: Transport>(&self, session: &Session<T>, offset: u64, limit: u64) -> Result<Page, ApiError>;
}

impl PageSource for BoardQuery {
    fn fetch_page<T: Transport>(&self, session: &Session<T>, offset: u64, limit: u64) -> Result<Page, ApiError> {
        session.get("boards/", &self.params(offset, limit))
    }
}

impl PageSource for PinQuery {
    fn fetch_page<T: Transport>(&self, session: &Session<T>, offset: u64, limit: u64) -> Result<Page, ApiError> {
        session.get("pins/", &self.params(offset, limit))
    }
}

/// Lazy, finite sequence of records walked page by page.
///
/// Yields `Err` at most once: after a failed fetch or an undecodable record
/// the listing is exhausted.
pub struct Listing<'a, T: Transport, Q, R> {
    session: &'a Session<T>,
    source: Q,
    offset: u64,
    remaining: Option<u64>,
    page_size: u64,
    buffer: VecDeque<Value>,
    last_page: bool,
    done: bool,
    _record: PhantomData<fn() -> R>,
}

impl<'a, T: Transport, Q: PageSource, R: DeserializeOwned> Listing<'a, T, Q, R> {
    pub(crate) fn new(session: &'a Session<T>, source: Q, options: ListOptions) -> Self {
        Self {
            session,
            source,
            offset: options.offset,
            remaining: (options.limit > 0).then_some(options.limit),
            page_size: options.page_size.max(1),
            buffer: VecDeque::new(),
            last_page: false,
            done: false,
            _record: PhantomData,
        }
    }

    fn fill(&mut self) -> Result<(), ApiError> {
        let page = self.source.fetch_page(self.session, self.offset, self.page_size)?;
        debug!(
            offset = self.offset,
            results = page.results.len(),
            has_next = page.next.is_some(),
            "fetched page"
        );
        self.offset += page.results.len() as u64;
        self.last_page = page.next.is_none() || page.results.is_empty();
        self.buffer.extend(page.results);
        Ok(())
    }
}

impl<'a, T: Transport, Q: PageSource, R: DeserializeOwned> Iterator for Listing<'a, T, Q, R> {
    type Item = Result<R, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        if self.buffer.is_empty() && !self.last_page {
            if let Err(err) = self.fill() {
                self.done = true;
                return Some(Err(err));
            }
        }
        let Some(value) = self.buffer.pop_front() else {
            self.done = true;
            return None;
        };
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        match serde_json::from_value(value) {
            Ok(record) => Some(Ok(record)),
            Err(err) => {
                self.done = true;
                Some(Err(err.into()))
            }
        }
    }
}

/// Consume `items` and return its only element.
///
/// Fails with `ApiError::Cardinality` on zero or several elements, and with
/// the first error the sequence yields.
pub fn single<R>(items: impl IntoIterator<Item = Result<R, ApiError>>) -> Result<R, ApiError> {
    let mut items = items.into_iter();
    let first = match items.next() {
        Some(first) => first?,
        None => return Err(ApiError::Cardinality { found: 0 }),
    };
    let mut found = 1;
    for item in items {
        item?;
        found += 1;
    }
    if found == 1 {
        Ok(first)
    } else {
        Err(ApiError::Cardinality { found })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::ScriptedTransport;
    use crate::types::fixtures;

    fn session(transport: &ScriptedTransport) -> Session<ScriptedTransport> {
        Session::new("http://host", "t", transport.clone()).unwrap()
    }

    fn page(results: Vec<Value>, next: bool) -> Value {
        let next = if next {
            json!("http://host/api/v2/boards/?offset=next")
        } else {
            Value::Null
        };
        json!({
            "count": null,
            "next": next,
            "previous": null,
            "results": results,
        })
    }

    fn boards(ids: std::ops::Range<u64>) -> Vec<Value> {
        ids.map(|id| fixtures::board(id, &format!("board {id}"))).collect()
    }

    fn query_value(url: &str, key: &str) -> Option<String> {
        url::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn board_query_params_include_filters() {
        let params = BoardQuery::new().search("among us").username("yizmeng").params(10, 50);
        assert_eq!(
            params,
            vec![
                ("limit", "50".to_string()),
                ("offset", "10".to_string()),
                ("search", "among us".to_string()),
                ("submitter__username", "yizmeng".to_string()),
            ]
        );
    }

    #[test]
    fn pin_query_defaults_to_descending_id() {
        let params = PinQuery::new().params(0, 50);
        assert!(params.contains(&("ordering", "-id".to_string())));
        assert_eq!(params.len(), 3);

        let params = PinQuery::new().board_id(4).tag("red").ordering("id").params(0, 50);
        assert!(params.contains(&("pins__id", "4".to_string())));
        assert!(params.contains(&("tags__name", "red".to_string())));
        assert!(params.contains(&("ordering", "id".to_string())));
    }

    #[test]
    fn listing_is_lazy() {
        let transport = ScriptedTransport::new();
        transport.respond(200, page(boards(1..3), true));
        let s = session(&transport);

        let mut listing: Listing<'_, _, _, Board> = Listing::new(&s, BoardQuery::new(), ListOptions::default());
        assert!(transport.requests().is_empty());
        assert_eq!(listing.next().unwrap().unwrap().id, 1);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(listing.next().unwrap().unwrap().id, 2);
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn listing_stops_when_next_is_null() {
        let transport = ScriptedTransport::new();
        transport.respond(200, page(boards(1..3), true));
        transport.respond(200, page(boards(3..4), false));
        let s = session(&transport);

        let options = ListOptions {
            limit: 10,
            page_size: 2,
            ..ListOptions::default()
        };
        let ids: Vec<u64> = Listing::<_, _, Board>::new(&s, BoardQuery::new(), options)
            .map(|board| board.unwrap().id)
            .collect();

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn listing_advances_offset_by_page_results() {
        let transport = ScriptedTransport::new();
        transport.respond(200, page(boards(1..3), true));
        transport.respond(200, page(boards(3..5), true));
        transport.respond(200, page(Vec::new(), true));
        let s = session(&transport);

        let options = ListOptions {
            offset: 5,
            limit: 0,
            page_size: 2,
        };
        let count = Listing::<_, _, Board>::new(&s, BoardQuery::new(), options).count();
        assert_eq!(count, 4);

        let offsets: Vec<String> = transport
            .requests()
            .iter()
            .map(|req| query_value(&req.url, "offset").unwrap())
            .collect();
        assert_eq!(offsets, vec!["5", "7", "9"]);
        assert!(transport
            .requests()
            .iter()
            .all(|req| query_value(&req.url, "limit").as_deref() == Some("2")));
    }

    #[test]
    fn listing_honors_overall_limit() {
        let transport = ScriptedTransport::new();
        transport.respond(200, page(boards(1..4), true));
        let s = session(&transport);

        let options = ListOptions {
            limit: 2,
            page_size: 3,
            ..ListOptions::default()
        };
        let ids: Vec<u64> = Listing::<_, _, Board>::new(&s, BoardQuery::new(), options)
            .map(|board| board.unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn listing_stops_after_fetch_error() {
        let transport = ScriptedTransport::new();
        transport.respond_raw(500, "boom");
        let s = session(&transport);

        let mut listing: Listing<'_, _, _, Board> = Listing::new(&s, BoardQuery::new(), ListOptions::default());
        assert!(matches!(
            listing.next(),
            Some(Err(ApiError::HttpError { status: 500, .. }))
        ));
        assert!(listing.next().is_none());
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn listing_stops_after_malformed_record() {
        let transport = ScriptedTransport::new();
        let mut results = boards(1..3);
        results[0]["submitter"]["resource_link"] = json!("bogus");
        transport.respond(200, page(results, false));
        let s = session(&transport);

        let mut listing: Listing<'_, _, _, Board> = Listing::new(&s, BoardQuery::new(), ListOptions::default());
        assert!(matches!(listing.next(), Some(Err(ApiError::DeserializationError(_)))));
        assert!(listing.next().is_none());
    }

    #[test]
    fn listing_rejects_envelope_without_next() {
        let transport = ScriptedTransport::new();
        transport.respond(200, json!({"count": 2, "results": boards(1..3)}));
        let s = session(&transport);

        let mut listing: Listing<'_, _, _, Board> = Listing::new(&s, BoardQuery::new(), ListOptions::default());
        assert!(matches!(listing.next(), Some(Err(ApiError::DeserializationError(_)))));
        assert!(listing.next().is_none());
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn single_requires_exactly_one_item() {
        let one: Vec<Result<u32, ApiError>> = vec![Ok(7)];
        assert_eq!(single(one).unwrap(), 7);

        let none: Vec<Result<u32, ApiError>> = Vec::new();
        assert!(matches!(single(none), Err(ApiError::Cardinality { found: 0 })));

        let two: Vec<Result<u32, ApiError>> = vec![Ok(1), Ok(2)];
        assert!(matches!(single(two), Err(ApiError::Cardinality { found: 2 })));

        let failed: Vec<Result<u32, ApiError>> = vec![Err(ApiError::EmptyResult("board"))];
        assert!(matches!(single(failed), Err(ApiError::EmptyResult(_))));
    }
}
