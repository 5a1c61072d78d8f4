//! Harness for driving the router against in-memory storage.

use crate::server::{ServerState, app};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use pinwall_common::{
    lifecycle::PostLifecycle,
    memory::{MemoryAuthRepository, MemoryImageStore, MemoryPostRepository},
    model::{
        auth::AuthToken,
        user::{CreateUser, User, UserHandle},
    },
    store::AuthRepository,
    validate::ValidationRules,
};
use serde_json::Value;
use std::{path::Path, sync::Arc};
use tower::ServiceExt;

const BOUNDARY: &str = "pinwall-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub posts: Arc<MemoryPostRepository>,
    pub images: Arc<MemoryImageStore>,
    pub user: User,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let posts = Arc::new(MemoryPostRepository::new());
        let images = Arc::new(MemoryImageStore::new());
        let auth = Arc::new(MemoryAuthRepository::new());

        let user = auth
            .create_user(&CreateUser {
                handle: UserHandle::new("asel".to_owned()).unwrap(),
            })
            .await
            .unwrap()
            .unwrap();
        let token = AuthToken::generate_random(user.id);
        auth.create_auth(user.id, &token.hash().unwrap(), None)
            .await
            .unwrap();

        let state = ServerState {
            posts: Arc::new(PostLifecycle::new(
                posts.clone(),
                images.clone(),
                ValidationRules::default(),
            )),
            auth,
            token_lifetime: None,
        };
        let router = app(state, Path::new("test-images-unused"), 1024 * 1024);

        Self {
            router,
            posts,
            images,
            user,
            token: token.encode(),
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn request(&self, method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, self.bearer())
            .body(Body::empty())
            .unwrap()
    }

    pub fn form(&self, method: Method, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, self.bearer())
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Creates a post through the API and returns its JSON.
    pub async fn create_post(&self, title: &str) -> Value {
        let request = self.form(
            Method::POST,
            "/feed/post",
            &[
                Part::Text("title", title),
                Part::Text("content", "Some content here"),
                Part::File("image", "duck.png", "image/png", b"png bytes"),
            ],
        );
        let (status, body) = self.send(request).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        body["post"].clone()
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    /// Field name, file name, content type, payload.
    File(&'a str, &'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; \
                         name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
