//! Stubs shared by the unit tests of this crate.

use crate::{
    Result,
    batch::{BatchFetch, Cursor, Page},
    stream::Clock,
    transport::{Session, Transport, TransportError, TransportResponse},
};
use reqwest::StatusCode;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    time::{Duration, Instant},
};
use time::OffsetDateTime;
use twitscrape_common::model::{Id, post::Post, user::UserMarker};

pub(crate) const USER: u64 = 783_214;

pub(crate) fn post(id: u64, timestamp: i64) -> Post {
    Post {
        id: Id::new(id),
        author_id: Id::new(USER),
        created_at: OffsetDateTime::from_unix_timestamp(timestamp).unwrap(),
        text: format!("post {id}"),
        reshare_of: None,
    }
}

pub(crate) fn reshare(id: u64, timestamp: i64) -> Post {
    let mut original = post(id + 10_000, timestamp - 1);
    original.author_id = Id::new(1);

    Post {
        reshare_of: Some(Box::new(original)),
        ..post(id, timestamp)
    }
}

pub(crate) fn timestamps<'a>(posts: impl IntoIterator<Item = &'a Post>) -> Vec<i64> {
    posts
        .into_iter()
        .map(|post| post.created_at.unix_timestamp())
        .collect()
}

pub(crate) fn user_id() -> Id<UserMarker> {
    Id::new(USER)
}

pub(crate) enum Attempt {
    Respond(TransportResponse),
    Fail(TransportError),
}

impl Attempt {
    pub(crate) fn respond(status: StatusCode, body: &str) -> Self {
        Self::Respond(TransportResponse {
            status,
            body: body.to_owned(),
        })
    }

    pub(crate) fn fail(err: TransportError) -> Self {
        Self::Fail(err)
    }
}

type Request = (String, Vec<(String, String)>);

/// Plays back one scripted attempt per opened session.
pub(crate) struct StubTransport {
    attempts: RefCell<VecDeque<Attempt>>,
    sessions_opened: Cell<usize>,
    requests: Rc<RefCell<Vec<Request>>>,
}

impl StubTransport {
    pub(crate) fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: RefCell::new(attempts.into()),
            sessions_opened: Cell::new(0),
            requests: Rc::default(),
        }
    }

    pub(crate) fn sessions_opened(&self) -> usize {
        self.sessions_opened.get()
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }
}

pub(crate) struct StubSession {
    response: TransportResponse,
    requests: Rc<RefCell<Vec<Request>>>,
}

impl Transport for StubTransport {
    type Session = StubSession;

    fn open_session(&self) -> Result<StubSession, TransportError> {
        self.sessions_opened.set(self.sessions_opened.get() + 1);
        let attempt = self
            .attempts
            .borrow_mut()
            .pop_front()
            .expect("No scripted attempts left");

        match attempt {
            Attempt::Respond(response) => Ok(StubSession {
                response,
                requests: Rc::clone(&self.requests),
            }),
            Attempt::Fail(err) => Err(err),
        }
    }
}

impl Session for StubSession {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TransportResponse, TransportError> {
        let query = query
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        self.requests.borrow_mut().push((url.to_owned(), query));

        Ok(self.response.clone())
    }
}

/// Returns scripted pages in order, then empty pages.
pub(crate) struct ScriptedFetcher {
    pages: RefCell<VecDeque<Result<Page>>>,
    cursors: RefCell<Vec<Option<Cursor>>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(pages: Vec<Result<Page>>) -> Self {
        Self {
            pages: RefCell::new(pages.into()),
            cursors: RefCell::default(),
        }
    }

    /// Cursors passed to each fetch so far.
    pub(crate) fn cursors(&self) -> Vec<Option<Cursor>> {
        self.cursors.borrow().clone()
    }
}

pub(crate) fn page(items: Vec<Post>, pinned: Option<Post>, forward: &str) -> Page {
    Page {
        items,
        pinned,
        forward: Cursor::new(forward.to_owned()),
        backward: Cursor::new(format!("before-{forward}")),
    }
}

impl BatchFetch for ScriptedFetcher {
    fn fetch_batch(&self, user_id: Id<UserMarker>, cursor: Option<&Cursor>) -> Result<Page> {
        assert_eq!(user_id, crate::testing::user_id());
        self.cursors.borrow_mut().push(cursor.cloned());

        self.pages
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(page(Vec::new(), None, "end")))
    }
}

pub(crate) struct Feed {
    /// Newest first.
    pub(crate) posts: Vec<Post>,
    pub(crate) pinned: Option<Post>,
    page_size: usize,
    /// Clock reading at the start of every fetch.
    pub(crate) fetch_times: Vec<Duration>,
}

/// Pages through a live, mutable feed with numeric offset cursors.
#[derive(Clone)]
pub(crate) struct FeedFetcher {
    feed: Rc<RefCell<Feed>>,
    clock: FakeClock,
    latency: Duration,
}

impl FeedFetcher {
    pub(crate) fn new(posts: Vec<Post>, page_size: usize, clock: FakeClock) -> Self {
        Self {
            feed: Rc::new(RefCell::new(Feed {
                posts,
                pinned: None,
                page_size,
                fetch_times: Vec::new(),
            })),
            clock,
            latency: Duration::ZERO,
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn feed(&self) -> std::cell::RefMut<'_, Feed> {
        self.feed.borrow_mut()
    }

    pub(crate) fn publish(&self, post: Post) {
        self.feed().posts.insert(0, post);
    }
}

impl BatchFetch for FeedFetcher {
    fn fetch_batch(&self, _user_id: Id<UserMarker>, cursor: Option<&Cursor>) -> Result<Page> {
        let mut feed = self.feed.borrow_mut();
        feed.fetch_times.push(self.clock.elapsed());
        self.clock.advance(self.latency);

        let offset = cursor.map_or(0, |cursor| cursor.as_str().parse().unwrap());
        let end = (offset + feed.page_size).min(feed.posts.len()).max(offset);
        let items = feed
            .posts
            .get(offset..end)
            .map(<[Post]>::to_vec)
            .unwrap_or_default();
        let pinned = if offset == 0 { feed.pinned.clone() } else { None };

        Ok(page(items, pinned, &end.to_string()))
    }
}

/// Manually driven clock; sleeping advances it instantly.
#[derive(Clone)]
pub(crate) struct FakeClock {
    origin: Instant,
    elapsed: Rc<Cell<Duration>>,
    on_sleep: Rc<RefCell<Option<Box<dyn FnMut()>>>>,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Rc::default(),
            on_sleep: Rc::default(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub(crate) fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }

    /// Runs `hook` after every sleep, e.g. to publish posts between polls.
    pub(crate) fn on_sleep(&self, hook: impl FnMut() + 'static) {
        *self.on_sleep.borrow_mut() = Some(Box::new(hook));
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        if let Some(hook) = self.on_sleep.borrow_mut().as_mut() {
            hook();
        }
    }
}
