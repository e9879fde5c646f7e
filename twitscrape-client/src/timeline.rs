use crate::{
    Result,
    batch::{BatchFetch, Cursor},
};
use std::collections::VecDeque;
use tracing::debug;
use twitscrape_common::model::{Id, post::Post, user::UserMarker};

/// A user's timeline, newest post first, fetched page by page on demand.
///
/// The service lists the pinned post ahead of everything else. Here it is
/// moved to where its creation time puts it: right before the first post that
/// is strictly older. Posts with the same timestamp as the pinned post stay
/// ahead of it.
///
/// The iterator ends when the service returns an empty page, or after the
/// first error.
pub struct Timeline<F> {
    fetcher: F,
    user_id: Id<UserMarker>,
    include_reshares: bool,
    cursor: Option<Cursor>,
    pinned: Option<Post>,
    pinned_emitted: bool,
    buffered: VecDeque<Post>,
    finished: bool,
}

impl<F: BatchFetch> Timeline<F> {
    pub fn new(fetcher: F, user_id: Id<UserMarker>, include_reshares: bool) -> Self {
        Self {
            fetcher,
            user_id,
            include_reshares,
            cursor: None,
            pinned: None,
            pinned_emitted: false,
            buffered: VecDeque::new(),
            finished: false,
        }
    }

    fn wanted(&self, post: &Post) -> bool {
        self.include_reshares || !post.is_reshare()
    }

    fn is_pinned(&self, post: &Post) -> bool {
        self.pinned
            .as_ref()
            .is_some_and(|pinned| pinned.key() == post.key())
    }

    /// Hands out the pinned post once, if it belongs before `next`.
    ///
    /// `None` for `next` means the timeline has ended.
    fn take_pinned_before(&mut self, next: Option<&Post>) -> Option<Post> {
        if self.pinned_emitted {
            return None;
        }
        let pinned = self.pinned.as_ref()?;
        if next.is_some_and(|next| next.created_at >= pinned.created_at) {
            return None;
        }

        self.pinned_emitted = true;
        Some(pinned.clone())
    }
}

impl<F: BatchFetch> Iterator for Timeline<F> {
    type Item = Result<Post>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            if let Some(post) = self.buffered.pop_front() {
                if let Some(pinned) = self.take_pinned_before(Some(&post)) {
                    self.buffered.push_front(post);
                    if self.wanted(&pinned) {
                        return Some(Ok(pinned));
                    }
                } else if self.wanted(&post) && !self.is_pinned(&post) {
                    return Some(Ok(post));
                }
                continue;
            }

            let page = match self.fetcher.fetch_batch(self.user_id, self.cursor.as_ref()) {
                Ok(page) => page,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            };
            self.cursor = Some(page.forward.clone());

            if page.is_empty() {
                debug!(user_id = %self.user_id, "Reached the end of the timeline");
                self.finished = true;
                return self
                    .take_pinned_before(None)
                    .filter(|pinned| self.wanted(pinned))
                    .map(Ok);
            }

            if self.pinned.is_none() {
                self.pinned = page.pinned;
            }
            self.buffered.extend(page.items);
        }

        None
    }
}

/// The `count` most recent posts, newest first.
pub fn last_posts<F: BatchFetch>(
    fetcher: F,
    user_id: Id<UserMarker>,
    count: usize,
    include_reshares: bool,
) -> Result<Vec<Post>> {
    Timeline::new(fetcher, user_id, include_reshares)
        .take(count)
        .collect()
}
