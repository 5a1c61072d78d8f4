use crate::server::ServerRouter;

mod auth;
mod feed;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(feed::routes())
        .merge(auth::routes())
}
