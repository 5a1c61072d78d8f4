//! In-memory storage ports for tests. Data is lost when the value is dropped.

use crate::{
    model::{
        Id,
        auth::{AuthTokenHash, Authentication, TokenLifetime},
        image::{ImageRef, ImageUpload},
        post::{NewPost, Post, PostChanges, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    store::{AuthRepository, ImageStore, PostRepository, StoreError},
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use time::{OffsetDateTime, UtcDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Posts in insertion order.
#[derive(Debug, Default)]
pub struct MemoryPostRepository {
    posts: RwLock<Vec<Post>>,
}

impl MemoryPostRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.posts.read().await.is_empty()
    }
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn find_all(&self) -> Result<Vec<Post>, StoreError> {
        Ok(self.posts.read().await.iter().rev().cloned().collect())
    }

    async fn find_by_id(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
        let posts = self.posts.read().await;
        Ok(posts.iter().find(|post| post.id == id).cloned())
    }

    async fn insert(&self, post: NewPost) -> Result<Post, StoreError> {
        let now = OffsetDateTime::now_utc();
        let post = Post {
            id: Id::generate(),
            title: post.title,
            content: post.content,
            image_ref: post.image_ref,
            creator: post.creator,
            created_at: now,
            updated_at: now,
        };

        self.posts.write().await.push(post.clone());
        Ok(post)
    }

    async fn update(
        &self,
        id: Id<PostMarker>,
        changes: PostChanges,
    ) -> Result<Option<Post>, StoreError> {
        let mut posts = self.posts.write().await;
        let Some(post) = posts.iter_mut().find(|post| post.id == id) else {
            return Ok(None);
        };

        post.title = changes.title;
        post.content = changes.content;
        post.image_ref = changes.image_ref;
        post.updated_at = OffsetDateTime::now_utc();

        Ok(Some(post.clone()))
    }

    async fn delete_by_id(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
        let mut posts = self.posts.write().await;
        let index = posts.iter().position(|post| post.id == id);
        Ok(index.map(|index| posts.remove(index)))
    }
}

/// Image store keeping payloads in a map. Saves and deletes can be made to
/// fail.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    images: RwLock<HashMap<ImageRef, Vec<u8>>>,
    fail_saves: AtomicBool,
    fail_deletes: AtomicBool,
    delete_calls: AtomicUsize,
}

impl MemoryImageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.images.read().await.is_empty()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn save(&self, upload: &ImageUpload) -> Result<Option<ImageRef>, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::images("disk full"));
        }

        let Some(kind) = upload.kind() else {
            return Ok(None);
        };

        let image = ImageRef::new(format!("images/{}.{}", Uuid::now_v7(), kind.extension()));
        self.images
            .write()
            .await
            .insert(image.clone(), upload.bytes.clone());

        Ok(Some(image))
    }

    async fn read(&self, image: &ImageRef) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.images.read().await.get(image).cloned())
    }

    async fn delete(&self, image: &ImageRef) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::images(format!("refusing to delete {image}")));
        }

        match self.images.write().await.remove(image) {
            Some(_) => Ok(()),
            None => Err(StoreError::images(format!("no image stored at {image}"))),
        }
    }
}

#[derive(Debug)]
struct StoredAuth {
    user: Id<UserMarker>,
    created_at: UtcDateTime,
    expires_after: Option<TokenLifetime>,
}

#[derive(Debug, Default)]
pub struct MemoryAuthRepository {
    users: RwLock<HashMap<Id<UserMarker>, User>>,
    auths: RwLock<HashMap<AuthTokenHash, StoredAuth>>,
}

impl MemoryAuthRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthRepository for MemoryAuthRepository {
    async fn fetch_auth(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>, StoreError> {
        let auths = self.auths.read().await;
        let Some(stored) = auths.get(token_hash) else {
            return Ok(None);
        };
        let users = self.users.read().await;
        let user = users
            .get(&stored.user)
            .cloned()
            .ok_or_else(|| StoreError::repository("authentication without user"))?;

        Ok(Some(Authentication {
            user,
            token_hash: token_hash.clone(),
            created_at: stored.created_at,
            expires_after: stored.expires_after,
        }))
    }

    async fn create_user(&self, user: &CreateUser) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|existing| existing.handle == user.handle) {
            return Ok(None);
        }

        let user = User {
            id: Id::generate(),
            handle: user.handle.clone(),
        };
        users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn create_auth(
        &self,
        user: Id<UserMarker>,
        token_hash: &AuthTokenHash,
        expires_after: Option<TokenLifetime>,
    ) -> Result<(), StoreError> {
        self.auths.write().await.insert(
            token_hash.clone(),
            StoredAuth {
                user,
                created_at: UtcDateTime::now(),
                expires_after,
            },
        );
        Ok(())
    }
}
