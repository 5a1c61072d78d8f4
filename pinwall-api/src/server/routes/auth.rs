use crate::server::{
    Result, ServerError, ServerRouter,
    json::{Created, Json},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use pinwall_common::{
    model::{
        auth::{AuthToken, TokenLifetime},
        user::{CreateUser, User},
    },
    store::AuthRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(signup)
}

#[derive(TypedPath)]
#[typed_path("/auth/signup")]
struct SignupPath;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
struct SignupResponse {
    user: User,
    token: String,
}

async fn signup(
    _: SignupPath,
    State(auth): State<Arc<dyn AuthRepository>>,
    State(token_lifetime): State<Option<TokenLifetime>>,
    Json(create_user): Json<CreateUser>,
) -> Result<Created<SignupResponse>> {
    let user = auth
        .create_user(&create_user)
        .await?
        .ok_or(ServerError::HandleTaken(create_user.handle))?;

    let token = AuthToken::generate_random(user.id);
    auth.create_auth(user.id, &token.hash()?, token_lifetime)
        .await?;

    debug!(user = %user.id, "Signed up user");
    Ok(Created(SignupResponse {
        user,
        token: token.encode(),
    }))
}
