use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Extension;
use clap::Parser;
use orchestrator::application::{Application, Configuration};
use std::net::SocketAddr;
use tokio::signal;
use tokio::sync::oneshot;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::{debug, error, info};

pub type Router<S = Application> = axum::Router<S>;

#[tokio::main]
async fn main() -> Result<()> {
    info!("orchestrator starting");
    let configuration = Configuration::parse();

    debug!("installing logging to local file");
    Application::install_logging(&configuration);

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        signal::ctrl_c().await.expect("failed to listen for event");
        let _ = tx.send(());
    });

    let application = Application::initialize(configuration).await?;
    debug!("initialized application");

    tokio::select! {
        _ = run(application) => {}
        _ = rx => {
            debug!("signal received, shutting down");
        }
    }

    Ok(())
}

pub async fn run(application: Application) -> Result<()> {
    let mut joins = tokio::task::JoinSet::new();
    joins.spawn(start(application));

    while let Some(result) = joins.join_next().await {
        if let Ok(Err(err)) = result {
            error!(?err, "orchestrator failed");
            return Err(err);
        }
    }

    Ok(())
}

pub async fn start(app: Application) -> anyhow::Result<()> {
    let bind = SocketAddr::new(app.config.host.parse()?, app.config.port);

    let api = Router::new()
        .route("/health", get(orchestrator::webserver::health::health))
        .route("/task", post(orchestrator::webserver::task::task))
        .layer(Extension(app.clone()))
        .with_state(app)
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024));

    let router = Router::new().nest("/api", api);

    axum::Server::bind(&bind).serve(router.into_make_service()).await?;

    Ok(())
}
