use anyhow::{anyhow, bail, Context};
use log::{error, info, warn};
use mimalloc::MiMalloc;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use warp::Filter;

use snapwall::config::Config;
use snapwall::db_pool::{self, DbPool};
use snapwall::handlers_health::build_health_routes;
use snapwall::handlers_slideshow::build_slideshow_routes;
use snapwall::handlers_submission::build_submission_routes;
use snapwall::maintenance::MaintenanceScheduler;
use snapwall::slideshow::SlideshowSessions;
use snapwall::submission_store::SqliteSubmissionStore;
use snapwall::warp_helpers::{cors, handle_rejection};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::from_env().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;

    info!("Starting snapwall on {}", addr);
    info!("Database: {}", config.db_path);
    info!(
        "Slides shown for {} ms, up to {:?} slides per playlist",
        config.slideshow.display_duration_ms, config.slideshow.target_slides
    );

    if !is_address_available(addr) {
        error!(
            "Address {} is already in use. Stop the other snapwall instance or set SNAPWALL_PORT.",
            addr
        );
        bail!("Address {} is already in use", addr);
    }

    let (db_pool, store, sessions) = initialize_services(&config).await?;

    let maintenance = MaintenanceScheduler::new(
        db_pool.clone(),
        sessions.clone(),
        config.slideshow.session_idle,
    );
    let _maintenance_handle = maintenance.start();

    let health_routes = build_health_routes(db_pool, sessions.clone());
    let slideshow_routes = build_slideshow_routes(store.clone(), sessions.clone());
    let submission_routes = build_submission_routes(store);

    let routes = health_routes
        .or(slideshow_routes)
        .or(submission_routes)
        .with(cors())
        .with(warp::log("snapwall"))
        .recover(handle_rejection);

    info!("Server started, listening on http://{}", addr);

    tokio::select! {
        _ = warp::serve(routes).run(addr) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
    }

    if sessions.shutdown(SHUTDOWN_GRACE).await {
        info!("All slideshow sessions closed, bye");
    } else {
        warn!("Slideshow sessions closed, some play counts may not have been written");
    }

    Ok(())
}

fn is_address_available(addr: SocketAddr) -> bool {
    TcpListener::bind(addr).is_ok()
}

async fn initialize_services(
    config: &Config,
) -> anyhow::Result<(DbPool, SqliteSubmissionStore, SlideshowSessions)> {
    let db_pool = db_pool::create_db_pool(&config.db_path, config.max_connections)
        .await
        .map_err(|e| anyhow!("Failed to open database {}: {}", config.db_path, e))?;
    info!("Database initialized successfully");

    let store = SqliteSubmissionStore::new(db_pool.clone());
    let sessions = SlideshowSessions::new(Arc::new(store.clone()), config.slideshow.clone());

    Ok((db_pool, store, sessions))
}
