//! Wire records for single posts and their decoding into [`Post`].

use crate::model::{Id, post::Post};
use serde::Deserialize;
use std::num::ParseIntError;
use thiserror::Error;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

/// Reshares of reshares do not occur in practice; anything deeper is malformed.
pub const MAX_RESHARE_DEPTH: usize = 8;

/// `Wed Oct 10 20:19:24 +0000 2018`
pub const CREATED_AT_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short] [month repr:short] [day] [hour]:[minute]:[second] \
    [offset_hour sign:mandatory][offset_minute] [year]"
);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Post is not readable by this session")]
    Unreadable,
    #[error("Invalid id {0:?}: {1}")]
    InvalidId(String, ParseIntError),
    #[error("Invalid creation time {0:?}: {1}")]
    InvalidCreatedAt(String, time::error::Parse),
    #[error("Reshare chain is deeper than {MAX_RESHARE_DEPTH}")]
    ReshareTooDeep,
}

/// A post as it appears in timeline instructions.
///
/// `legacy` is missing for posts the session lacks permission to read.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
pub struct RawPost {
    pub legacy: Option<RawPostLegacy>,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
pub struct RawPostLegacy {
    pub user_id_str: String,
    pub id_str: String,
    pub created_at: String,
    pub full_text: String,
    pub retweeted_status: Option<Box<RawPost>>,
}

impl RawPost {
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.legacy.is_some()
    }

    fn decode_at_depth(self, depth: usize) -> Result<Post, DecodeError> {
        if depth > MAX_RESHARE_DEPTH {
            return Err(DecodeError::ReshareTooDeep);
        }
        let legacy = self.legacy.ok_or(DecodeError::Unreadable)?;

        let reshare_of = legacy
            .retweeted_status
            .map(|raw| raw.decode_at_depth(depth + 1).map(Box::new))
            .transpose()?;

        Ok(Post {
            id: parse_id(legacy.id_str)?,
            author_id: parse_id(legacy.user_id_str)?,
            created_at: parse_created_at(legacy.created_at)?,
            text: legacy.full_text,
            reshare_of,
        })
    }
}

impl TryFrom<RawPost> for Post {
    type Error = DecodeError;

    fn try_from(value: RawPost) -> Result<Self, Self::Error> {
        value.decode_at_depth(0)
    }
}

fn parse_id<Marker>(id: String) -> Result<Id<Marker>, DecodeError> {
    id.parse().map_err(|err| DecodeError::InvalidId(id, err))
}

pub fn parse_created_at(created_at: String) -> Result<OffsetDateTime, DecodeError> {
    OffsetDateTime::parse(&created_at, CREATED_AT_FORMAT)
        .map_err(|err| DecodeError::InvalidCreatedAt(created_at, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn raw(value: serde_json::Value) -> RawPost {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_plain_post() {
        let post = Post::try_from(raw(json!({
            "legacy": {
                "user_id_str": "783214",
                "id_str": "1050118621198921728",
                "created_at": "Wed Oct 10 20:19:24 +0000 2018",
                "full_text": "To make room for more expression",
            },
            "core": {},
        })))
        .unwrap();

        assert_eq!(post.id, Id::new(1_050_118_621_198_921_728));
        assert_eq!(post.author_id, Id::new(783_214));
        assert_eq!(post.created_at, datetime!(2018-10-10 20:19:24 UTC));
        assert_eq!(post.body(), "To make room for more expression");
        assert!(!post.is_reshare());
    }

    #[test]
    fn decodes_reshare_with_offset() {
        let post = Post::try_from(raw(json!({
            "legacy": {
                "user_id_str": "1",
                "id_str": "20",
                "created_at": "Sun Feb 14 12:00:00 +0100 2021",
                "full_text": "RT @other: hello…",
                "retweeted_status": {
                    "legacy": {
                        "user_id_str": "2",
                        "id_str": "10",
                        "created_at": "Fri May 01 08:30:00 +0000 2020",
                        "full_text": "hello world",
                    }
                }
            }
        })))
        .unwrap();

        assert_eq!(post.created_at, datetime!(2021-02-14 11:00:00 UTC));
        assert_eq!(post.body(), "hello world");
        assert_eq!(post.original().author_id, Id::new(2));
    }

    #[test]
    fn rejects_unreadable_and_malformed() {
        assert!(matches!(
            Post::try_from(raw(json!({}))),
            Err(DecodeError::Unreadable)
        ));

        let bad_time = raw(json!({
            "legacy": {
                "user_id_str": "1",
                "id_str": "2",
                "created_at": "2018-10-10T20:19:24Z",
                "full_text": "",
            }
        }));
        assert!(matches!(
            Post::try_from(bad_time),
            Err(DecodeError::InvalidCreatedAt(..))
        ));

        let bad_id = raw(json!({
            "legacy": {
                "user_id_str": "1",
                "id_str": "x2",
                "created_at": "Wed Oct 10 20:19:24 +0000 2018",
                "full_text": "",
            }
        }));
        assert!(matches!(Post::try_from(bad_id), Err(DecodeError::InvalidId(..))));
    }

    #[test]
    fn rejects_deep_reshare_chain() {
        let mut value = json!({
            "legacy": {
                "user_id_str": "1",
                "id_str": "1",
                "created_at": "Wed Oct 10 20:19:24 +0000 2018",
                "full_text": "leaf",
            }
        });
        for _ in 0..=MAX_RESHARE_DEPTH {
            let mut wrapper = value.clone();
            wrapper["legacy"]["retweeted_status"] = value;
            value = wrapper;
        }

        assert!(matches!(
            Post::try_from(raw(value)),
            Err(DecodeError::ReshareTooDeep)
        ));
    }
}
