mod catalog_client;
mod config;
mod domain;
mod local_api;

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use catalog_client::CatalogClient;
use config::Config;
use domain::{Orchestrator, events::TracingEventSink};
use local_api::{LocalApi, conflicts::PendingConflicts};
use poem::{
    EndpointExt, Route, Server,
    listener::TcpListener,
    middleware::{Cors, Tracing as PoemTracing},
};
use poem_openapi::OpenApiService;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder, prelude::*};

type BookDlResult<T> = anyhow::Result<T>;

#[tokio::main]
async fn main() -> BookDlResult<()> {
    // Respect RUST_LOG if set, default to info for our crate and warn for deps.
    let default_filter = format!(
        "{}=info,poem=info,reqwest=warn,h2=warn",
        env!("CARGO_PKG_NAME")
    );
    let env_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);
    SubscriberBuilder::default()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .with_level(true)
        .pretty()
        .finish()
        .with(ErrorLayer::default())
        .init();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting book download client"
    );
    if Path::new(".env.local").exists() {
        dotenvy::from_filename(".env.local")?;
    } else if Path::new(".env").exists() {
        dotenvy::from_filename(".env")?;
    };
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let client = if config.connect_timeout_secs > 0 {
        CatalogClient::with_connect_timeout(
            &config.service_url,
            Some(Duration::from_secs(config.connect_timeout_secs)),
        )
    } else {
        CatalogClient::new(&config.service_url)
    }
    .with_context(|| format!("Failed to build client for {}", config.service_url))?;
    tracing::info!(service_url = %config.service_url, "configured catalog client");

    let conflicts = Arc::new(PendingConflicts::default());
    let orchestrator = Arc::new(Orchestrator::new(
        client,
        conflicts.clone(),
        Arc::new(TracingEventSink),
    ));

    spawn_status_poll(orchestrator.clone(), config.status_poll_secs);
    run_poem(orchestrator, conflicts, &config).await?;
    Ok(())
}

/// Fill every slice once, then keep the status slice fresh in the background.
fn spawn_status_poll(orchestrator: Arc<Orchestrator>, every_secs: u64) {
    tokio::spawn(async move {
        orchestrator.refresh_all().await;
        if every_secs == 0 {
            tracing::info!("status polling disabled");
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_secs(every_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let view = orchestrator.status.refresh().await;
            tracing::debug!(
                active = ?view.active_count,
                stale = view.stale,
                "status polled"
            );
        }
    });
}

pub async fn run_poem(
    orchestrator: Arc<Orchestrator>,
    conflicts: Arc<PendingConflicts>,
    config: &Config,
) -> BookDlResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    let api = LocalApi {
        orchestrator,
        conflicts,
    };
    let api_service = OpenApiService::new(api, "Book Download Client API", version)
        .server(format!("http://{}", config.bind_addr));
    let ui = api_service.rapidoc();
    let spec = api_service.spec();
    let route = Route::new()
        .nest("/", api_service)
        .nest("/ui", ui)
        .nest("/spec", poem::endpoint::make_sync(move |_| spec.clone()))
        .with(Cors::new())
        .with(PoemTracing);

    let bind_addr = config.bind_addr.as_str();
    tracing::info!(%bind_addr, "starting HTTP server");
    Server::new(TcpListener::bind(bind_addr)).run(route).await?;
    Ok(())
}
