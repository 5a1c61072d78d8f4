use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    form::PostForm,
    json::{Created, Json},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use pinwall_common::{
    lifecycle::PostLifecycle,
    model::{
        Id,
        post::{Post, PostMarker},
    },
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_delete(delete_post)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct PostsResponse {
    message: String,
    posts: Vec<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct PostResponse {
    message: String,
    post: Post,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(TypedPath)]
#[typed_path("/feed/posts")]
struct PostsPath;

#[derive(TypedPath)]
#[typed_path("/feed/post")]
struct NewPostPath;

#[derive(TypedPath, Deserialize)]
#[typed_path("/feed/post/{post_id}", rejection(ServerError))]
struct PostPath {
    post_id: Id<PostMarker>,
}

async fn list_posts(
    _: PostsPath,
    State(posts): State<Arc<PostLifecycle>>,
    _: AuthenticatedUser,
) -> Result<Json<PostsResponse>> {
    let posts = posts.list_posts().await?;

    Ok(Json(PostsResponse {
        message: "Fetched posts successfully".to_owned(),
        posts,
    }))
}

async fn create_post(
    _: NewPostPath,
    State(posts): State<Arc<PostLifecycle>>,
    user: AuthenticatedUser,
    form: PostForm,
) -> Result<Created<PostResponse>> {
    let post = posts.create_post(user.user(), form.into_create()).await?;

    Ok(Created(PostResponse {
        message: "Post created successfully!".to_owned(),
        post,
    }))
}

async fn get_post(
    PostPath { post_id }: PostPath,
    State(posts): State<Arc<PostLifecycle>>,
    _: AuthenticatedUser,
) -> Result<Json<PostResponse>> {
    let post = posts.get_post(post_id).await?;

    Ok(Json(PostResponse {
        message: "Post fetched".to_owned(),
        post,
    }))
}

async fn update_post(
    PostPath { post_id }: PostPath,
    State(posts): State<Arc<PostLifecycle>>,
    _: AuthenticatedUser,
    form: PostForm,
) -> Result<Json<PostResponse>> {
    let post = posts.update_post(post_id, form.into_update()).await?;

    Ok(Json(PostResponse {
        message: "Post updated!".to_owned(),
        post,
    }))
}

async fn delete_post(
    PostPath { post_id }: PostPath,
    State(posts): State<Arc<PostLifecycle>>,
    _: AuthenticatedUser,
) -> Result<Json<MessageResponse>> {
    posts.delete_post(post_id).await?;

    Ok(Json(MessageResponse {
        message: "Deleted post.".to_owned(),
    }))
}
