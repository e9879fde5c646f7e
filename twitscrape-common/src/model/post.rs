use crate::model::{Id, user::UserMarker};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

/// Natural primary key of a post.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct PostKey {
    pub author_id: Id<UserMarker>,
    pub id: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author_id: Id<UserMarker>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub text: String,
    /// The post this one reshares, if it is a reshare.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reshare_of: Option<Box<Post>>,
}

impl Post {
    #[must_use]
    pub fn key(&self) -> PostKey {
        PostKey {
            author_id: self.author_id,
            id: self.id,
        }
    }

    #[must_use]
    pub fn is_reshare(&self) -> bool {
        self.reshare_of.is_some()
    }

    /// Follows the reshare chain down to the post that was originally written.
    #[must_use]
    pub fn original(&self) -> &Post {
        let mut post = self;
        while let Some(reshared) = &post.reshare_of {
            post = reshared;
        }
        post
    }

    /// The text a reader sees: a reshare shows its original's text.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.original().text
    }
}
