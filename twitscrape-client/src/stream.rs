use crate::{Result, batch::BatchFetch, timeline::Timeline};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};
use time::OffsetDateTime;
use tracing::debug;
use twitscrape_common::model::{Id, post::Post, user::UserMarker};

pub trait Clock {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct StreamOptions {
    /// How many existing posts to emit before polling starts.
    pub initial_count: usize,
    pub polling_interval: Duration,
    pub include_reshares: bool,
}

/// A live feed of a user's posts, oldest first, that never ends on its own.
///
/// The first `initial_count` posts are the most recent ones at start-up. After
/// that the timeline is fetched again every `polling_interval`, measured from
/// start-up rather than from the end of the previous poll, and only posts
/// strictly newer than everything emitted so far are passed on.
///
/// This blocks the calling thread while sleeping and fetching. It ends only
/// after returning an error.
pub struct PostStream<F, C = SystemClock> {
    fetcher: F,
    user_id: Id<UserMarker>,
    options: StreamOptions,
    clock: C,
    started_at: Option<Instant>,
    polls: u32,
    /// Creation time of the newest post queued so far.
    position: OffsetDateTime,
    pending: VecDeque<Post>,
    failed: bool,
}

impl<F: BatchFetch> PostStream<F> {
    pub fn new(fetcher: F, user_id: Id<UserMarker>, options: StreamOptions) -> Self {
        Self::with_clock(fetcher, user_id, options, SystemClock)
    }
}

impl<F: BatchFetch, C: Clock> PostStream<F, C> {
    pub fn with_clock(
        fetcher: F,
        user_id: Id<UserMarker>,
        options: StreamOptions,
        clock: C,
    ) -> Self {
        Self {
            fetcher,
            user_id,
            options,
            clock,
            started_at: None,
            polls: 0,
            position: OffsetDateTime::UNIX_EPOCH,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    #[must_use]
    pub fn position(&self) -> OffsetDateTime {
        self.position
    }

    fn timeline(&self) -> Timeline<&F> {
        Timeline::new(&self.fetcher, self.user_id, self.options.include_reshares)
    }

    fn bootstrap(&mut self) -> Result<()> {
        debug!(count = self.options.initial_count, "Getting most recent posts");
        let newest_first = self
            .timeline()
            .take(self.options.initial_count)
            .collect::<Result<Vec<_>>>()?;

        self.enqueue(newest_first);
        Ok(())
    }

    pub(crate) fn poll(&mut self) -> Result<()> {
        debug!(since = %self.position, "Checking for new posts");
        let mut newest_first = Vec::new();
        for post in self.timeline() {
            let post = post?;
            if post.created_at <= self.position {
                break;
            }
            newest_first.push(post);
        }

        self.enqueue(newest_first);
        Ok(())
    }

    fn enqueue(&mut self, newest_first: Vec<Post>) {
        for post in newest_first.into_iter().rev() {
            self.position = self.position.max(post.created_at);
            self.pending.push_back(post);
        }
    }

    fn sleep_until_next_poll(&mut self, started_at: Instant) {
        self.polls += 1;
        let wake_at = started_at + self.options.polling_interval.saturating_mul(self.polls);
        let delay = wake_at.saturating_duration_since(self.clock.now());

        debug!("Sleeping for {} seconds", delay.as_secs());
        self.clock.sleep(delay);
    }
}

impl<F: BatchFetch, C: Clock> Iterator for PostStream<F, C> {
    type Item = Result<Post>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(post) = self.pending.pop_front() {
                return Some(Ok(post));
            }
            if self.failed {
                return None;
            }

            let round = if let Some(started_at) = self.started_at {
                self.sleep_until_next_poll(started_at);
                self.poll()
            } else {
                self.started_at = Some(self.clock.now());
                self.bootstrap()
            };

            if let Err(err) = round {
                self.failed = true;
                return Some(Err(err));
            }
        }
    }
}
