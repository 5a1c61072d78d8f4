use crate::record::{AuthenticationRecord, PostRecord, UserRecord};
use async_trait::async_trait;
use pinwall_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication, TokenLifetime},
        post::{NewPost, Post, PostChanges, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    store::{AuthRepository, PostRepository, StoreError},
};
use sqlx::{PgPool, postgres::PgPoolOptions, query, query_as};
use thiserror::Error;
use tracing::debug;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        StoreError::repository(value)
    }
}

#[derive(Clone, Debug)]
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and brings the schema up to date.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        debug!("Database migrations applied");

        Ok(Self::new(pool))
    }

    pub async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_id,
                posts.title,
                posts.content,
                posts.image_ref,
                users.user_id,
                users.handle,
                posts.created_at,
                posts.updated_at
            FROM
                posts.posts JOIN users.users ON users.user_id = posts.user_id
            ORDER BY
                posts.created_at DESC,
                posts.post_id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_id,
                posts.title,
                posts.content,
                posts.image_ref,
                users.user_id,
                users.handle,
                posts.created_at,
                posts.updated_at
            FROM
                posts.posts JOIN users.users ON users.user_id = posts.user_id
            WHERE
                posts.post_id = $1
            ",
        )
        .bind(post_id.uuid())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let post_id = Id::<PostMarker>::generate();

        let record = query_as::<_, PostRecord>(
            "
            WITH inserted AS (
                INSERT INTO posts.posts (post_id, title, content, image_ref, user_id)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            )
            SELECT
                inserted.post_id,
                inserted.title,
                inserted.content,
                inserted.image_ref,
                users.user_id,
                users.handle,
                inserted.created_at,
                inserted.updated_at
            FROM
                inserted JOIN users.users ON users.user_id = inserted.user_id
            ",
        )
        .bind(post_id.uuid())
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.image_ref.get())
        .bind(post.creator.id.uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(Post::try_from(record)?)
    }

    pub async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        changes: &PostChanges,
    ) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            WITH updated AS (
                UPDATE posts.posts
                SET title = $2, content = $3, image_ref = $4, updated_at = now()
                WHERE post_id = $1
                RETURNING *
            )
            SELECT
                updated.post_id,
                updated.title,
                updated.content,
                updated.image_ref,
                users.user_id,
                users.handle,
                updated.created_at,
                updated.updated_at
            FROM
                updated JOIN users.users ON users.user_id = updated.user_id
            ",
        )
        .bind(post_id.uuid())
        .bind(&changes.title)
        .bind(&changes.content)
        .bind(changes.image_ref.get())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            WITH deleted AS (
                DELETE FROM posts.posts
                WHERE post_id = $1
                RETURNING *
            )
            SELECT
                deleted.post_id,
                deleted.title,
                deleted.content,
                deleted.image_ref,
                users.user_id,
                users.handle,
                deleted.created_at,
                deleted.updated_at
            FROM
                deleted JOIN users.users ON users.user_id = deleted.user_id
            ",
        )
        .bind(post_id.uuid())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    /// `None` if the handle is taken.
    pub async fn create_user(&self, user: &CreateUser) -> Result<Option<User>> {
        let user_id = Id::<UserMarker>::generate();

        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_id, handle)
            VALUES ($1, $2)
            ON CONFLICT (handle) DO NOTHING
            RETURNING user_id, handle
            ",
        )
        .bind(user_id.uuid())
        .bind(user.handle.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                users.user_id,
                users.handle,
                authentications.token_hash,
                authentications.created_at,
                authentications.expires_after_seconds
            FROM
                users.authentications
                JOIN users.users ON users.user_id = authentications.user_id
            WHERE
                authentications.token_hash = $1
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    pub async fn create_auth(
        &self,
        user_id: Id<UserMarker>,
        token_hash: &AuthTokenHash,
        expires_after: Option<TokenLifetime>,
    ) -> Result<()> {
        query(
            "
            INSERT INTO users.authentications (token_hash, user_id, expires_after_seconds)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(&token_hash.0[..])
        .bind(user_id.uuid())
        .bind(expires_after.map(TokenLifetime::whole_seconds))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PostRepository for DbClient {
    async fn find_all(&self) -> Result<Vec<Post>, StoreError> {
        Ok(self.fetch_posts().await?)
    }

    async fn find_by_id(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
        Ok(self.fetch_post(id).await?)
    }

    async fn insert(&self, post: NewPost) -> Result<Post, StoreError> {
        Ok(self.create_post(&post).await?)
    }

    async fn update(
        &self,
        id: Id<PostMarker>,
        changes: PostChanges,
    ) -> Result<Option<Post>, StoreError> {
        Ok(self.update_post(id, &changes).await?)
    }

    async fn delete_by_id(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
        Ok(self.delete_post(id).await?)
    }
}

#[async_trait]
impl AuthRepository for DbClient {
    async fn fetch_auth(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>, StoreError> {
        Ok(DbClient::fetch_auth(self, token_hash).await?)
    }

    async fn create_user(&self, user: &CreateUser) -> Result<Option<User>, StoreError> {
        Ok(DbClient::create_user(self, user).await?)
    }

    async fn create_auth(
        &self,
        user: Id<UserMarker>,
        token_hash: &AuthTokenHash,
        expires_after: Option<TokenLifetime>,
    ) -> Result<(), StoreError> {
        Ok(DbClient::create_auth(self, user, token_hash, expires_after).await?)
    }
}
