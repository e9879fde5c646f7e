use crate::{
    Result,
    query::{ApplicationErrors, QueryExecutor, USER_TWEETS, decode_data},
    transport::Transport,
};
use serde::Deserialize;
use serde_json::json;
use std::cmp::Reverse;
use thiserror::Error;
use tracing::debug;
use twitscrape_common::model::{
    Id,
    post::Post,
    raw::RawPost,
    user::UserMarker,
};

/// Opaque pagination token. Only ever handed back to the service unchanged.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Cursor(String);

impl Cursor {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum CursorKind {
    Top,
    Bottom,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum MalformedPageError {
    #[error("Found {0} pinned posts, expected at most one")]
    MultiplePinned(usize),
    #[error("No timeline entries in the response")]
    MissingEntries,
    #[error("No {0:?} cursor in the response")]
    MissingCursor(CursorKind),
    #[error("More than one {0:?} cursor in the response")]
    DuplicateCursor(CursorKind),
}

/// One batch of a user's timeline.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Page {
    /// Newest first.
    pub items: Vec<Post>,
    pub pinned: Option<Post>,
    /// Fetches older posts.
    pub forward: Cursor,
    /// Fetches newer posts.
    pub backward: Cursor,
}

impl Page {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.pinned.is_none()
    }
}

pub trait BatchFetch {
    fn fetch_batch(&self, user_id: Id<UserMarker>, cursor: Option<&Cursor>) -> Result<Page>;
}

impl<F: BatchFetch + ?Sized> BatchFetch for &F {
    fn fetch_batch(&self, user_id: Id<UserMarker>, cursor: Option<&Cursor>) -> Result<Page> {
        (**self).fetch_batch(user_id, cursor)
    }
}

pub struct BatchFetcher<T> {
    executor: QueryExecutor<T>,
    batch_count: u32,
}

impl<T> BatchFetcher<T> {
    #[must_use]
    pub fn new(executor: QueryExecutor<T>, batch_count: u32) -> Self {
        Self {
            executor,
            batch_count,
        }
    }

    #[must_use]
    pub fn executor(&self) -> &QueryExecutor<T> {
        &self.executor
    }
}

impl<T: Transport> BatchFetch for BatchFetcher<T> {
    fn fetch_batch(&self, user_id: Id<UserMarker>, cursor: Option<&Cursor>) -> Result<Page> {
        debug!(count = self.batch_count, "Requesting posts");

        let variables = json!({
            "userId": user_id,
            "count": self.batch_count,
            "cursor": cursor.map(Cursor::as_str),
            "withHighlightedLabel": true,
            "withTweetQuoteCount": false,
            "includePromotedContent": false,
            "withTweetResult": false,
            "withReactions": false,
            "withUserResults": false,
            "withVoice": false,
            "withNonLegacyCard": false,
            "withBirdwatchPivots": false,
        });
        let data = self
            .executor
            .execute(USER_TWEETS, &variables, ApplicationErrors::Ignore)?;
        let data: UserTweetsData = decode_data(USER_TWEETS, data)?;

        let page = Page::from_instructions(data.user.result.timeline.timeline.instructions)?;
        debug!(received = page.items.len(), "Received posts");

        Ok(page)
    }
}

#[derive(Deserialize)]
struct UserTweetsData {
    user: UserResult,
}

#[derive(Deserialize)]
struct UserResult {
    result: UserTimeline,
}

#[derive(Deserialize)]
struct UserTimeline {
    timeline: TimelineWrapper,
}

#[derive(Deserialize)]
struct TimelineWrapper {
    timeline: Instructions,
}

#[derive(Deserialize)]
struct Instructions {
    instructions: Vec<Instruction>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
pub(crate) enum Instruction {
    TimelinePinEntry {
        entry: Entry,
    },
    TimelineAddEntries {
        entries: Vec<Entry>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
pub(crate) struct Entry {
    content: EntryContent,
}

#[derive(Deserialize)]
#[serde(tag = "entryType")]
enum EntryContent {
    TimelineTimelineItem {
        #[serde(rename = "itemContent")]
        item_content: ItemContent,
    },
    TimelineTimelineCursor {
        #[serde(rename = "cursorType")]
        cursor_type: String,
        value: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ItemContent {
    tweet: RawPost,
}

impl Page {
    /// Splits timeline instructions into pinned post, posts and cursors.
    ///
    /// Posts without read permission are dropped.
    pub(crate) fn from_instructions(instructions: Vec<Instruction>) -> Result<Self> {
        let mut pinned_posts = Vec::new();
        let mut entries = None;

        for instruction in instructions {
            match instruction {
                Instruction::TimelinePinEntry { entry } => {
                    if let EntryContent::TimelineTimelineItem { item_content } = entry.content
                        && item_content.tweet.is_readable()
                    {
                        pinned_posts.push(item_content.tweet);
                    }
                }
                Instruction::TimelineAddEntries { entries: added } => {
                    entries.get_or_insert(added);
                }
                Instruction::Other => {}
            }
        }

        if pinned_posts.len() > 1 {
            return Err(MalformedPageError::MultiplePinned(pinned_posts.len()).into());
        }
        let pinned = pinned_posts.pop().map(Post::try_from).transpose()?;

        let mut items = Vec::new();
        let mut backward = None;
        let mut forward = None;
        for entry in entries.ok_or(MalformedPageError::MissingEntries)? {
            match entry.content {
                EntryContent::TimelineTimelineItem { item_content } => {
                    if item_content.tweet.is_readable() {
                        items.push(Post::try_from(item_content.tweet)?);
                    }
                }
                EntryContent::TimelineTimelineCursor { cursor_type, value } => {
                    let (slot, kind) = match cursor_type.as_str() {
                        "Top" => (&mut backward, CursorKind::Top),
                        "Bottom" => (&mut forward, CursorKind::Bottom),
                        _ => continue,
                    };
                    if slot.replace(Cursor::new(value)).is_some() {
                        return Err(MalformedPageError::DuplicateCursor(kind).into());
                    }
                }
                EntryContent::Other => {}
            }
        }

        // The service's own ordering is not trusted.
        items.sort_by_key(|post| Reverse(post.created_at));

        Ok(Self {
            items,
            pinned,
            forward: forward.ok_or(MalformedPageError::MissingCursor(CursorKind::Bottom))?,
            backward: backward.ok_or(MalformedPageError::MissingCursor(CursorKind::Top))?,
        })
    }
}
