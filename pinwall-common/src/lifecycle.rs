//! Post lifecycle: validation, image storage and record storage for every post
//! operation, and the rules that keep a post and its image file in sync.
//!
//! Consistency between the repository and the image store is best-effort.
//! Images are written before the record that points at them and removed after
//! the record stopped pointing at them. A failed image removal is logged and
//! otherwise ignored, the record is authoritative.

use crate::{
    model::{
        Id,
        image::{ImageRef, ImageUpload},
        post::{Creator, NewPost, Post, PostChanges, PostMarker},
        user::User,
    },
    store::{ImageStore, PostRepository, StoreError},
    validate::{FieldFailure, ValidationError, ValidationRules},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Could not find post {0}")]
    NotFound(Id<PostMarker>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum PostErrorKind {
    Validation,
    NotFound,
    StoreFailure,
}

impl PostError {
    #[must_use]
    pub fn kind(&self) -> PostErrorKind {
        match self {
            PostError::Validation(_) => PostErrorKind::Validation,
            PostError::NotFound(_) => PostErrorKind::NotFound,
            PostError::Store(_) => PostErrorKind::StoreFailure,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub title: String,
    pub content: String,
    pub image: Option<ImageUpload>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct UpdatePost {
    pub title: String,
    pub content: String,
    /// A replacement image.
    pub image: Option<ImageUpload>,
    /// The reference the client believes the post currently has.
    pub existing_image: Option<ImageRef>,
}

pub struct PostLifecycle {
    posts: Arc<dyn PostRepository>,
    images: Arc<dyn ImageStore>,
    rules: ValidationRules,
}

impl PostLifecycle {
    #[must_use]
    pub fn new(
        posts: Arc<dyn PostRepository>,
        images: Arc<dyn ImageStore>,
        rules: ValidationRules,
    ) -> Self {
        Self {
            posts,
            images,
            rules,
        }
    }

    #[must_use]
    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    pub async fn list_posts(&self) -> Result<Vec<Post>, PostError> {
        Ok(self.posts.find_all().await?)
    }

    pub async fn get_post(&self, id: Id<PostMarker>) -> Result<Post, PostError> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or(PostError::NotFound(id))
    }

    /// Image presence is checked twice: once up front, and once more after
    /// the store had a chance to reject the payload's content type.
    pub async fn create_post(&self, creator: &User, post: CreatePost) -> Result<Post, PostError> {
        let CreatePost {
            title,
            content,
            image,
        } = post;

        self.rules
            .validate_create(&title, &content, image.is_some())?;

        let image_ref = match &image {
            Some(upload) => self.images.save(upload).await?,
            None => None,
        }
        .ok_or_else(|| ValidationError::single(FieldFailure::no_image_provided()))?;

        let new_post = NewPost {
            title: title.trim().to_owned(),
            content: content.trim().to_owned(),
            image_ref: image_ref.clone(),
            creator: Creator::from(creator.clone()),
        };

        match self.posts.insert(new_post).await {
            Ok(post) => {
                debug!(
                    post = %post.id,
                    image = %post.image_ref,
                    creator = %creator.id,
                    "Created post"
                );
                Ok(post)
            }
            Err(err) => {
                self.discard_image(&image_ref).await;
                Err(err.into())
            }
        }
    }

    pub async fn update_post(
        &self,
        id: Id<PostMarker>,
        post: UpdatePost,
    ) -> Result<Post, PostError> {
        let UpdatePost {
            title,
            content,
            image,
            existing_image,
        } = post;

        self.rules.validate_update(
            &title,
            &content,
            image.is_some() || existing_image.is_some(),
        )?;

        let current = self
            .posts
            .find_by_id(id)
            .await?
            .ok_or(PostError::NotFound(id))?;

        let fresh_image = match &image {
            Some(upload) => self.images.save(upload).await?,
            None => None,
        };

        let image_ref = match (&fresh_image, existing_image) {
            (Some(fresh), _) => fresh.clone(),
            (None, Some(existing)) if existing == current.image_ref => existing,
            (None, Some(_)) => {
                return Err(ValidationError::single(FieldFailure::foreign_image_ref()).into());
            }
            (None, None) => {
                return Err(ValidationError::single(FieldFailure::no_image_picked()).into());
            }
        };

        let changes = PostChanges {
            title: title.trim().to_owned(),
            content: content.trim().to_owned(),
            image_ref,
        };

        let updated = match self.posts.update(id, changes).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.discard_fresh_image(fresh_image.as_ref()).await;
                return Err(PostError::NotFound(id));
            }
            Err(err) => {
                self.discard_fresh_image(fresh_image.as_ref()).await;
                return Err(err.into());
            }
        };

        if updated.image_ref != current.image_ref {
            self.discard_image(&current.image_ref).await;
        }

        debug!(post = %id, image = %updated.image_ref, "Updated post");
        Ok(updated)
    }

    /// The image goes first. A missing or undeletable image never keeps a
    /// post record alive.
    pub async fn delete_post(&self, id: Id<PostMarker>) -> Result<(), PostError> {
        let post = self
            .posts
            .find_by_id(id)
            .await?
            .ok_or(PostError::NotFound(id))?;

        self.discard_image(&post.image_ref).await;

        self.posts
            .delete_by_id(id)
            .await?
            .ok_or(PostError::NotFound(id))?;

        debug!(post = %id, "Deleted post");
        Ok(())
    }

    async fn discard_image(&self, image: &ImageRef) {
        if let Err(err) = self.images.delete(image).await {
            warn!(%image, error = %err, "Could not delete image, leaving it orphaned");
        }
    }

    async fn discard_fresh_image(&self, image: Option<&ImageRef>) {
        if let Some(image) = image {
            self.discard_image(image).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        lifecycle::{CreatePost, PostError, PostErrorKind, PostLifecycle, UpdatePost},
        memory::{MemoryImageStore, MemoryPostRepository},
        model::{
            Id,
            image::{ImageRef, ImageUpload},
            post::{NewPost, Post, PostChanges, PostMarker},
            user::{User, UserHandle},
        },
        store::{ImageStore, PostRepository, StoreError},
        validate::{FailureReason, Field, FieldFailure, ValidationRules},
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Harness {
        posts: Arc<MemoryPostRepository>,
        images: Arc<MemoryImageStore>,
        lifecycle: PostLifecycle,
        user: User,
    }

    fn harness() -> Harness {
        let posts = Arc::new(MemoryPostRepository::new());
        let images = Arc::new(MemoryImageStore::new());
        let lifecycle = PostLifecycle::new(
            posts.clone(),
            images.clone(),
            ValidationRules::default(),
        );

        Harness {
            posts,
            images,
            lifecycle,
            user: User {
                id: Id::generate(),
                handle: UserHandle::new("asel".to_owned()).unwrap(),
            },
        }
    }

    fn png(bytes: &[u8]) -> ImageUpload {
        ImageUpload::new("image/png", bytes)
    }

    fn create_request(title: &str, image: Option<ImageUpload>) -> CreatePost {
        CreatePost {
            title: title.to_owned(),
            content: "Some content".to_owned(),
            image,
        }
    }

    fn update_request(image: Option<ImageUpload>, existing: Option<&ImageRef>) -> UpdatePost {
        UpdatePost {
            title: "Edited title".to_owned(),
            content: "Edited content".to_owned(),
            image,
            existing_image: existing.cloned(),
        }
    }

    async fn create(h: &Harness) -> Post {
        h.lifecycle
            .create_post(&h.user, create_request("First post", Some(png(b"first"))))
            .await
            .unwrap()
    }

    fn validation_failures(err: PostError) -> Vec<FieldFailure> {
        match err {
            PostError::Validation(err) => err.failures,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_stores_record_and_image() {
        let h = harness();

        let post = h
            .lifecycle
            .create_post(
                &h.user,
                CreatePost {
                    title: "  First post  ".to_owned(),
                    content: " Hello world ".to_owned(),
                    image: Some(png(b"png bytes")),
                },
            )
            .await
            .unwrap();

        assert_eq!(post.title, "First post");
        assert_eq!(post.content, "Hello world");
        assert_eq!(post.creator.id, h.user.id);
        assert_eq!(post.creator.name, h.user.handle);
        assert_eq!(
            h.images.read(&post.image_ref).await.unwrap().as_deref(),
            Some(&b"png bytes"[..])
        );
        assert_eq!(h.lifecycle.get_post(post.id).await.unwrap(), post);
    }

    #[tokio::test]
    async fn create_with_short_title_stores_nothing() {
        let h = harness();

        let err = h
            .lifecycle
            .create_post(&h.user, create_request("Hey", Some(png(b"x"))))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), PostErrorKind::Validation);
        assert_eq!(
            validation_failures(err),
            vec![FieldFailure {
                field: Field::Title,
                reason: FailureReason::TooShort { min_len: 5 },
            }]
        );
        assert!(h.posts.is_empty().await);
        assert_eq!(h.images.len().await, 0);
    }

    #[tokio::test]
    async fn create_with_unsupported_image_type() {
        let h = harness();

        let err = h
            .lifecycle
            .create_post(
                &h.user,
                create_request("Valid title", Some(ImageUpload::new("image/gif", &b"GIF89a"[..]))),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Validation failed, entered data is incorrect: No image provided"
        );
        assert_eq!(validation_failures(err), vec![FieldFailure::no_image_provided()]);
        assert!(h.posts.is_empty().await);
        assert_eq!(h.images.len().await, 0);
    }

    #[tokio::test]
    async fn create_without_image() {
        let h = harness();

        let err = h
            .lifecycle
            .create_post(&h.user, create_request("Valid title", None))
            .await
            .unwrap_err();

        assert_eq!(validation_failures(err), vec![FieldFailure::no_image_provided()]);
        assert!(h.posts.is_empty().await);
    }

    #[tokio::test]
    async fn create_discards_image_when_insert_fails() {
        let images = Arc::new(MemoryImageStore::new());
        let lifecycle = PostLifecycle::new(
            Arc::new(BrokenRepository),
            images.clone(),
            ValidationRules::default(),
        );
        let user = harness().user;

        let err = lifecycle
            .create_post(&user, create_request("Valid title", Some(png(b"x"))))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), PostErrorKind::StoreFailure);
        assert_eq!(images.len().await, 0);
    }

    #[tokio::test]
    async fn create_with_failing_image_save() {
        let h = harness();
        h.images.fail_saves(true);

        let err = h
            .lifecycle
            .create_post(&h.user, create_request("Valid title", Some(png(b"x"))))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), PostErrorKind::StoreFailure);
        assert!(h.posts.is_empty().await);
        assert!(h.images.is_empty().await);
    }

    #[tokio::test]
    async fn list_on_empty_store() {
        let h = harness();

        assert_eq!(h.lifecycle.list_posts().await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let h = harness();
        let first = create(&h).await;
        let second = create(&h).await;

        let posts = h.lifecycle.list_posts().await.unwrap();

        assert_eq!(posts, vec![second, first]);
    }

    #[tokio::test]
    async fn update_replacing_image_removes_old_file() {
        let h = harness();
        let post = create(&h).await;

        let updated = h
            .lifecycle
            .update_post(post.id, update_request(Some(png(b"second")), None))
            .await
            .unwrap();

        assert_eq!(updated.title, "Edited title");
        assert_eq!(updated.content, "Edited content");
        assert_ne!(updated.image_ref, post.image_ref);
        assert_eq!(h.images.read(&post.image_ref).await.unwrap(), None);
        assert_eq!(
            h.images.read(&updated.image_ref).await.unwrap().as_deref(),
            Some(&b"second"[..])
        );
        assert_eq!(h.images.len().await, 1);
        assert_eq!(h.lifecycle.get_post(post.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn update_keeping_image_deletes_nothing() {
        let h = harness();
        let post = create(&h).await;

        let updated = h
            .lifecycle
            .update_post(post.id, update_request(None, Some(&post.image_ref)))
            .await
            .unwrap();

        assert_eq!(updated.image_ref, post.image_ref);
        assert_eq!(h.images.delete_calls(), 0);
        assert!(h.images.read(&post.image_ref).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_with_unsupported_image_falls_back_to_existing() {
        let h = harness();
        let post = create(&h).await;

        let updated = h
            .lifecycle
            .update_post(
                post.id,
                update_request(
                    Some(ImageUpload::new("image/gif", &b"GIF89a"[..])),
                    Some(&post.image_ref),
                ),
            )
            .await
            .unwrap();

        assert_eq!(updated.image_ref, post.image_ref);
        assert_eq!(h.images.len().await, 1);
    }

    #[tokio::test]
    async fn update_without_any_image() {
        let h = harness();
        let post = create(&h).await;

        let err = h
            .lifecycle
            .update_post(post.id, update_request(None, None))
            .await
            .unwrap_err();
        assert_eq!(validation_failures(err), vec![FieldFailure::no_image_picked()]);

        let err = h
            .lifecycle
            .update_post(
                post.id,
                update_request(Some(ImageUpload::new("text/plain", &b"hi"[..])), None),
            )
            .await
            .unwrap_err();
        assert_eq!(validation_failures(err), vec![FieldFailure::no_image_picked()]);

        assert_eq!(h.lifecycle.get_post(post.id).await.unwrap(), post);
    }

    #[tokio::test]
    async fn update_rejects_foreign_image_ref() {
        let h = harness();
        let post = create(&h).await;
        let other = create(&h).await;

        let err = h
            .lifecycle
            .update_post(post.id, update_request(None, Some(&other.image_ref)))
            .await
            .unwrap_err();

        assert_eq!(validation_failures(err), vec![FieldFailure::foreign_image_ref()]);
        assert_eq!(h.images.len().await, 2);
        assert_eq!(h.lifecycle.get_post(post.id).await.unwrap(), post);
    }

    #[tokio::test]
    async fn update_validation_runs_before_lookup() {
        let h = harness();

        let err = h
            .lifecycle
            .update_post(
                Id::generate(),
                UpdatePost {
                    title: "Hi".to_owned(),
                    ..update_request(Some(png(b"x")), None)
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), PostErrorKind::Validation);
        assert_eq!(h.images.len().await, 0);
    }

    #[tokio::test]
    async fn update_survives_failing_image_delete() {
        let h = harness();
        let post = create(&h).await;
        h.images.fail_deletes(true);

        let updated = h
            .lifecycle
            .update_post(post.id, update_request(Some(png(b"second")), None))
            .await
            .unwrap();

        assert_ne!(updated.image_ref, post.image_ref);
        assert_eq!(h.images.delete_calls(), 1);
        assert_eq!(h.lifecycle.get_post(post.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn delete_removes_record_and_image() {
        let h = harness();
        let post = create(&h).await;

        h.lifecycle.delete_post(post.id).await.unwrap();

        assert_eq!(h.images.read(&post.image_ref).await.unwrap(), None);
        let err = h.lifecycle.get_post(post.id).await.unwrap_err();
        assert!(matches!(err, PostError::NotFound(id) if id == post.id));
    }

    #[tokio::test]
    async fn delete_survives_failing_image_delete() {
        let h = harness();
        let post = create(&h).await;
        h.images.fail_deletes(true);

        h.lifecycle.delete_post(post.id).await.unwrap();

        assert_eq!(h.images.delete_calls(), 1);
        assert!(h.posts.is_empty().await);
    }

    #[tokio::test]
    async fn delete_twice() {
        let h = harness();
        let post = create(&h).await;

        h.lifecycle.delete_post(post.id).await.unwrap();
        let err = h.lifecycle.delete_post(post.id).await.unwrap_err();

        assert_eq!(err.kind(), PostErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let h = harness();
        create(&h).await;
        let id: Id<PostMarker> = Id::generate();

        let get = h.lifecycle.get_post(id).await.unwrap_err();
        let update = h
            .lifecycle
            .update_post(id, update_request(Some(png(b"x")), None))
            .await
            .unwrap_err();
        let delete = h.lifecycle.delete_post(id).await.unwrap_err();

        for err in [get, update, delete] {
            assert_eq!(err.kind(), PostErrorKind::NotFound);
        }
        assert_eq!(h.images.len().await, 1);
    }

    #[tokio::test]
    async fn repository_failures_surface_as_store_failures() {
        let lifecycle = PostLifecycle::new(
            Arc::new(BrokenRepository),
            Arc::new(MemoryImageStore::new()),
            ValidationRules::default(),
        );
        let id = Id::generate();

        let results = [
            lifecycle.list_posts().await.map(|_| ()),
            lifecycle.get_post(id).await.map(|_| ()),
            lifecycle.delete_post(id).await,
        ];

        for result in results {
            assert_eq!(result.unwrap_err().kind(), PostErrorKind::StoreFailure);
        }
    }

    #[tokio::test]
    async fn update_discards_fresh_image_when_write_fails() {
        let posts = Arc::new(FrozenRepository(MemoryPostRepository::new()));
        let images = Arc::new(MemoryImageStore::new());
        let lifecycle = PostLifecycle::new(posts, images.clone(), ValidationRules::default());
        let user = harness().user;
        let post = lifecycle
            .create_post(&user, create_request("Valid title", Some(png(b"old"))))
            .await
            .unwrap();

        let err = lifecycle
            .update_post(post.id, update_request(Some(png(b"new")), None))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), PostErrorKind::StoreFailure);
        assert_eq!(images.len().await, 1);
        assert_eq!(
            images.read(&post.image_ref).await.unwrap().as_deref(),
            Some(&b"old"[..])
        );
    }

    /// Reads and inserts work, updates fail.
    struct FrozenRepository(MemoryPostRepository);

    #[async_trait]
    impl PostRepository for FrozenRepository {
        async fn find_all(&self) -> Result<Vec<Post>, StoreError> {
            self.0.find_all().await
        }

        async fn find_by_id(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
            self.0.find_by_id(id).await
        }

        async fn insert(&self, post: NewPost) -> Result<Post, StoreError> {
            self.0.insert(post).await
        }

        async fn update(
            &self,
            _: Id<PostMarker>,
            _: PostChanges,
        ) -> Result<Option<Post>, StoreError> {
            Err(broken())
        }

        async fn delete_by_id(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
            self.0.delete_by_id(id).await
        }
    }

    struct BrokenRepository;

    fn broken() -> StoreError {
        StoreError::repository("connection reset")
    }

    #[async_trait]
    impl PostRepository for BrokenRepository {
        async fn find_all(&self) -> Result<Vec<Post>, StoreError> {
            Err(broken())
        }

        async fn find_by_id(&self, _: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
            Err(broken())
        }

        async fn insert(&self, _: NewPost) -> Result<Post, StoreError> {
            Err(broken())
        }

        async fn update(
            &self,
            _: Id<PostMarker>,
            _: PostChanges,
        ) -> Result<Option<Post>, StoreError> {
            Err(broken())
        }

        async fn delete_by_id(&self, _: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
            Err(broken())
        }
    }
}
