use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use pinwall_common::{
    model::{auth::AuthToken, user::User},
    store::AuthRepository,
};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user a valid bearer token was issued to.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    user: User,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user(&self) -> &User {
        &self.user
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn AuthRepository>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_token: AuthToken = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?
            .token()
            .parse()?;

        let token_hash = request_token.hash()?;

        let authentication = Arc::<dyn AuthRepository>::from_ref(state)
            .fetch_auth(&token_hash)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        if authentication.user.id != request_token.user_id {
            debug!(user = %request_token.user_id, "Token was issued to a different user");
            return Err(ServerError::InvalidToken);
        }

        if authentication.is_expired_at(UtcDateTime::now()) {
            debug!(user = %authentication.user.id, "Token expired");
            return Err(ServerError::InvalidToken);
        }

        Ok(Self {
            user: authentication.user,
        })
    }
}
