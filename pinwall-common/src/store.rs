//! Storage ports. The database and the image directory each implement one of
//! these; neither knows about the other.

use crate::model::{
    Id,
    auth::{AuthTokenHash, Authentication, TokenLifetime},
    image::{ImageRef, ImageUpload},
    post::{NewPost, Post, PostChanges, PostMarker},
    user::{CreateUser, User, UserMarker},
};
use async_trait::async_trait;
use std::error::Error as StdError;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Unexpected infrastructure failure of a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Post repository failed: {0}")]
    Repository(#[source] BoxError),
    #[error("Image store failed: {0}")]
    Images(#[source] BoxError),
}

impl StoreError {
    pub fn repository(err: impl Into<BoxError>) -> Self {
        Self::Repository(err.into())
    }

    pub fn images(err: impl Into<BoxError>) -> Self {
        Self::Images(err.into())
    }
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// All posts, newest first.
    async fn find_all(&self) -> Result<Vec<Post>, StoreError>;

    async fn find_by_id(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError>;

    /// Stores a post, assigning its id and timestamps.
    async fn insert(&self, post: NewPost) -> Result<Post, StoreError>;

    async fn update(
        &self,
        id: Id<PostMarker>,
        changes: PostChanges,
    ) -> Result<Option<Post>, StoreError>;

    /// Returns the removed post so its image can be cleaned up.
    async fn delete_by_id(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores the payload under a fresh unique name.
    ///
    /// Returns `Ok(None)` without storing anything when the declared content
    /// type is not a supported image type.
    async fn save(&self, upload: &ImageUpload) -> Result<Option<ImageRef>, StoreError>;

    async fn read(&self, image: &ImageRef) -> Result<Option<Vec<u8>>, StoreError>;

    /// Callers treat failures here as best-effort and only log them.
    async fn delete(&self, image: &ImageRef) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn fetch_auth(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>, StoreError>;

    /// Returns `None` when the handle is already taken. The check and the
    /// insert happen as one step.
    async fn create_user(&self, user: &CreateUser) -> Result<Option<User>, StoreError>;

    async fn create_auth(
        &self,
        user: Id<UserMarker>,
        token_hash: &AuthTokenHash,
        expires_after: Option<TokenLifetime>,
    ) -> Result<(), StoreError>;
}
