use crate::server::ServerState;
use pinwall_common::{
    lifecycle::PostLifecycle,
    model::auth::{NonPositiveLifetimeError, TokenLifetime},
    validate::ValidationRules,
};
use pinwall_db::client::{DbClient, DbError};
use pinwall_images::{DiskImageStore, ImageStoreError};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error opening the image directory: {0}")]
    Images(#[from] ImageStoreError),
    #[error("Error reading the token lifetime: {0}")]
    TokenLifetime(#[from] NonPositiveLifetimeError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: String,
    #[serde(default = "default_database_max_connections")]
    database_max_connections: u32,
    #[serde(default = "default_image_dir")]
    image_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,
    #[serde(default = "default_min_len")]
    create_title_min_len: usize,
    #[serde(default = "default_min_len")]
    update_title_min_len: usize,
    #[serde(default = "default_min_len")]
    content_min_len: usize,
    token_lifetime_seconds: Option<i64>,
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_min_len() -> usize {
    5
}

impl Env {
    fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            create_title_min_len: self.create_title_min_len,
            update_title_min_len: self.update_title_min_len,
            content_min_len: self.content_min_len,
        }
    }
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pinwall_api=debug,pinwall_common=debug,pinwall_db=debug,\
                pinwall_images=debug,tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "Listening for ctrl-c failed");
        }
        info!("Shutting down");
        trigger.cancel();
    });

    shutdown
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let token_lifetime = env
        .token_lifetime_seconds
        .map(TokenLifetime::from_seconds)
        .transpose()?;

    let db = Arc::new(DbClient::connect(&env.database_url, env.database_max_connections).await?);
    let images = Arc::new(DiskImageStore::open(env.image_dir.clone()).await?);

    let state = ServerState {
        posts: Arc::new(PostLifecycle::new(
            db.clone(),
            images.clone(),
            env.validation_rules(),
        )),
        auth: db,
        token_lifetime,
    };
    let app = server::app(state, images.root(), env.max_upload_bytes);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on_ctrl_c().cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
