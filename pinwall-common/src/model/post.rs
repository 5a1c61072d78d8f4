use crate::model::{
    Id,
    image::ImageRef,
    user::{User, UserHandle, UserMarker},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    pub title: String,
    pub content: String,
    pub image_ref: ImageRef,
    pub creator: Creator,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Creator {
    pub id: Id<UserMarker>,
    pub name: UserHandle,
}

/// A validated post that has not been stored yet.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image_ref: ImageRef,
    pub creator: Creator,
}

/// Replacement values for the mutable fields of a post.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostChanges {
    pub title: String,
    pub content: String,
    pub image_ref: ImageRef,
}

impl From<User> for Creator {
    fn from(value: User) -> Self {
        Self {
            id: value.id,
            name: value.handle,
        }
    }
}
