use pinwall_common::model::{
    ModelValidationError,
    auth::{Authentication, TokenLifetime},
    image::ImageRef,
    post::{Creator, Post},
    user::{User, UserHandle},
};
use sqlx::FromRow;
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: Uuid,
    pub handle: String,
}

/// A post joined with its creator.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: Uuid,
    pub title: String,
    pub content: String,
    pub image_ref: String,
    pub user_id: Uuid,
    pub handle: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AuthenticationRecord {
    pub user_id: Uuid,
    pub handle: String,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.into(),
            handle: UserHandle::new(value.handle)?,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.post_id.into(),
            title: value.title,
            content: value.content,
            image_ref: ImageRef::new(value.image_ref),
            creator: Creator {
                id: value.user_id.into(),
                name: UserHandle::new(value.handle)?,
            },
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl TryFrom<AuthenticationRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: AuthenticationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: User {
                id: value.user_id.into(),
                handle: UserHandle::new(value.handle)?,
            },
            token_hash: value.token_hash.try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(TokenLifetime::from_seconds)
                .transpose()?,
        })
    }
}
