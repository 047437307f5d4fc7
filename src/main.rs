use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::Parser;

use notify_gateway::api::{self, StoreState};
use notify_gateway::client::{ControllerHandle, GatewayStream, NotificationApi, StoreClient};
use notify_gateway::config::{self, Config};
use notify_gateway::presentation::{self, Filter};
use notify_gateway::proxy::{self, upstream::UpstreamClient, GatewayState};
use notify_gateway::store::memory::MemoryStore;
use notify_gateway::{cli, middleware, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_gateway(&cfg, port.unwrap_or(cfg.port)).await,
        Some(cli::Commands::Store { port }) => run_store(&cfg, port.unwrap_or(cfg.store_port)).await,
        Some(cli::Commands::Watch { filter }) => run_watch(&cfg, &filter).await,
        Some(cli::Commands::List) => list(&store_client(&cfg)?).await,
        Some(cli::Commands::Read { id }) => store_client(&cfg)?
            .mark_read(id)
            .await
            .map(|_| println!("Marked notification {} as read", id))
            .map_err(Into::into),
        Some(cli::Commands::ReadAll) => store_client(&cfg)?
            .mark_all_read()
            .await
            .map(|_| println!("Marked all notifications as read"))
            .map_err(Into::into),
        Some(cli::Commands::Delete { id }) => store_client(&cfg)?
            .delete(id)
            .await
            .map(|_| println!("Deleted notification {}", id))
            .map_err(Into::into),
        Some(cli::Commands::Generate) => generate(&store_client(&cfg)?).await,
        None => run_gateway(&cfg, cfg.port).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    telemetry::shutdown();
    result
}

async fn run_gateway(cfg: &Config, port: u16) -> anyhow::Result<()> {
    let state = Arc::new(GatewayState {
        upstream: UpstreamClient::new().context("failed to build upstream client")?,
        stream_url: cfg.upstream_stream_url(),
    });
    tracing::info!(upstream = %state.stream_url, "relaying upstream notification stream");

    let app = middleware::apply(proxy::gateway_router(state), &cfg.cors_origin);
    serve(app, port, "notification gateway").await
}

async fn run_store(cfg: &Config, port: u16) -> anyhow::Result<()> {
    let state = Arc::new(StoreState::new(Arc::new(MemoryStore::seeded())));
    let app = middleware::apply(
        Router::new().nest("/api", api::store_router(state)),
        &cfg.cors_origin,
    );
    serve(app, port, "development notification store").await
}

async fn serve(app: Router, port: u16, what: &str) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("{} listening on {}", what, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn run_watch(cfg: &Config, filter: &str) -> anyhow::Result<()> {
    let filter: Filter = filter.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let api = Arc::new(store_client(cfg)?);
    let source = Arc::new(GatewayStream::new(cfg.gateway_stream_url())?);

    let (handle, mut alerts) = ControllerHandle::spawn(api, source);
    let mut snapshots = handle.snapshots();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", presentation::render(&snapshot, &filter, chrono::Utc::now()));
            }
            Some(alert) = alerts.recv() => {
                println!("{}", presentation::render_alert(&alert));
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn store_client(cfg: &Config) -> anyhow::Result<StoreClient> {
    StoreClient::new(cfg.upstream_url.clone()).context("failed to build store client")
}

async fn list(client: &StoreClient) -> anyhow::Result<()> {
    let list = client.list().await?;
    println!(
        "{} notifications, {} unread",
        list.notifications.len(),
        list.unread_count
    );
    for n in &list.notifications {
        println!(
            "{}{} #{} [{}] {}",
            if n.read { " " } else { "*" },
            presentation::priority_marker(n.priority),
            n.id,
            n.kind(),
            n.title
        );
    }
    Ok(())
}

async fn generate(client: &StoreClient) -> anyhow::Result<()> {
    let batch = client.generate().await?;
    println!("{} ({})", batch.message, batch.count);
    for n in &batch.notifications {
        println!("  #{} [{}] {}", n.id, n.kind(), n.title);
    }
    Ok(())
}
