use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use http_body_util::BodyExt;
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use shared::config::LiveConfig;
use shared::types::server_config::AppConfig;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{debug, error, info, warn};

use crate::app::build_service;
use crate::cli::Args;
use crate::database::Database;
use crate::handlers::http::build_api_router;
use crate::handlers::http::utils::RequestBody;
use crate::mailer::LogMailer;
use crate::security::AddressKey;
use crate::state::AppState;

/// Accept connections on `listener` until `shutdown` resolves.
///
/// After the signal no new connections are accepted; open ones get up to
/// `server.shutdown_grace_secs` to finish before the limiter janitor is
/// stopped and the pool closed.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let (key_source, grace) = {
        let cfg = state.config.read().await;
        (
            cfg.limiter.key_source,
            Duration::from_secs(cfg.server.shutdown_grace_secs),
        )
    };

    let router = Arc::new(build_api_router());
    let app = build_service(state.clone(), router, AddressKey::shared(key_source)).await;
    let graceful = GracefulShutdown::new();

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                debug!("Accepted connection from {}", peer);

                let svc = ServiceBuilder::new()
                    .map_request(move |req: Request<Incoming>| {
                        let mut req: Request<RequestBody> =
                            req.map(|body| body.map_err(std::io::Error::other).boxed());
                        req.extensions_mut().insert::<SocketAddr>(peer);
                        req
                    })
                    .service(app.clone());

                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .serve_connection(TokioIo::new(stream), TowerToHyperService::new(svc));
                let conn = graceful.watch(conn);

                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        debug!("Error serving connection from {}: {:?}", peer, err);
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    drop(listener);

    tokio::select! {
        _ = graceful.shutdown() => {
            info!("All connections closed");
        }
        _ = tokio::time::sleep(grace) => {
            warn!("Grace period of {:?} elapsed with connections still open", grace);
        }
    }

    state.limiter.shutdown().await;
    state.db.close().await;
    info!("Server stopped");

    Ok(())
}

/// Connect storage, bind and serve until SIGINT or SIGTERM. `args` is kept
/// to re-resolve the config on SIGHUP.
pub async fn run(args: Args, config: AppConfig) -> Result<()> {
    let db = Database::connect(&config.database).await?;

    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(env = %config.server.env, "Listening on http://{}", addr);

    let state = AppState::new(config, db, Arc::new(LogMailer));
    spawn_reload_on_hangup(args, state.config.clone());
    serve(listener, state, shutdown_signal()).await
}

/// Re-resolve the config from `args` and swap it into `live`. A config that
/// fails to load or validate is logged and the running one kept.
pub async fn reload_config(args: &Args, live: &LiveConfig) -> bool {
    match args.load_config() {
        Ok(config) => {
            live.reload(config).await;
            info!("Configuration reloaded from {}", args.config);
            true
        }
        Err(e) => {
            warn!("Config reload rejected, keeping current settings: {}", e);
            false
        }
    }
}

#[cfg(unix)]
fn spawn_reload_on_hangup(args: Args, live: LiveConfig) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(sig) => sig,
            Err(e) => {
                error!("Failed to listen for SIGHUP: {}", e);
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!("Received SIGHUP");
            reload_config(&args, &live).await;
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_args: Args, _live: LiveConfig) {}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn write_config(file: &tempfile::NamedTempFile, body: &str) {
        std::fs::write(file.path(), body).unwrap();
    }

    #[tokio::test]
    async fn reload_swaps_valid_config_and_keeps_current_on_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_config(&file, "[auth]\nauthentication_ttl_hours = 2\n");

        let path = file.path().to_string_lossy().into_owned();
        let args = Args::parse_from(["movie-api", "--config", path.as_str()]);
        let live = LiveConfig::new(args.load_config().unwrap());
        assert_eq!(live.read().await.auth.authentication_ttl_hours, 2);

        write_config(&file, "[auth]\nauthentication_ttl_hours = 6\n");
        assert!(reload_config(&args, &live).await);
        assert_eq!(live.read().await.auth.authentication_ttl_hours, 6);

        write_config(&file, "[auth]\nauthentication_ttl_hours = 0\n");
        assert!(!reload_config(&args, &live).await);
        assert_eq!(live.read().await.auth.authentication_ttl_hours, 6);
    }
}
