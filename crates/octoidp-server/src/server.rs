use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{Method, Request, Response},
};
use octoidp_auth::client::ClientRegistry;
use octoidp_auth::connector::ConnectorRegistry;
use octoidp_auth::http::{IdpState, router};
use octoidp_auth::keys::{KeyManager, KeyRotator};
use octoidp_auth::oauth::AuthorizationServer;
use octoidp_db_memory::{MemoryStores, create_stores};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::bootstrap::{BootstrapStats, bootstrap_clients, bootstrap_users};
use crate::config::AppConfig;

pub struct IdpServer {
    addr: SocketAddr,
    config: AppConfig,
    app: Router,
    server: Arc<AuthorizationServer>,
    rotator: KeyRotator,
}

/// Wraps the identity provider routes with tracing, CORS and a body limit.
///
/// CORS only admits `GET`, which covers discovery and the key set.
pub fn build_app(state: IdpState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    router(state).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request<_>| {
                        use tracing::field::Empty;
                        // Query strings carry codes and session IDs; log the path only.
                        tracing::info_span!(
                            "http.request",
                            http.method = %req.method(),
                            http.path = %req.uri().path(),
                            http.status_code = Empty,
                        )
                    })
                    .on_response(
                        |res: &Response<_>, latency: Duration, span: &tracing::Span| {
                            span.record(
                                "http.status_code",
                                tracing::field::display(res.status().as_u16()),
                            );
                            tracing::info!(
                                http.status = %res.status().as_u16(),
                                elapsed_ms = %latency.as_millis(),
                                "request handled"
                            );
                        },
                    ),
            )
            .layer(cors)
            .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
    )
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    stores: Option<MemoryStores>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            stores: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses existing stores instead of fresh in-memory ones.
    pub fn with_stores(mut self, stores: MemoryStores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Seeds clients and users, builds connectors and installs the first
    /// signing key.
    pub async fn build(self) -> anyhow::Result<IdpServer> {
        let cfg = self.config;
        cfg.validate().map_err(anyhow::Error::msg)?;
        let stores = self.stores.unwrap_or_else(create_stores);
        let issuer = cfg.auth.issuer_url()?;

        let mut stats = BootstrapStats::default();
        let clients = ClientRegistry::new(stores.client_storage());
        bootstrap_clients(&clients, &cfg.clients, &mut stats).await?;
        bootstrap_users(
            stores.users.as_ref(),
            stores.users.as_ref(),
            &cfg.users,
            &mut stats,
        )
        .await?;

        let connectors = ConnectorRegistry::new();
        for connector in &cfg.connectors {
            connectors.register(connector.build(
                &issuer,
                stores.user_storage(),
                stores.password_storage(),
            )?)?;
        }
        if connectors.ids().is_empty() {
            tracing::warn!("No connectors configured; interactive logins are disabled");
        }

        let keys = Arc::new(KeyManager::new(cfg.auth.tokens.id_token_ttl));
        let rotator = KeyRotator::new(Arc::clone(&keys), cfg.auth.keys.clone());
        let kid = rotator.rotate_now().await?;
        tracing::info!(kid = %kid, algorithm = cfg.auth.keys.algorithm.as_str(), "Initial signing key installed");

        let server = Arc::new(AuthorizationServer::new(
            &cfg.auth,
            keys,
            Arc::new(clients),
            Arc::new(connectors),
            stores.auth(),
        )?);
        let app = build_app(IdpState::new(Arc::clone(&server)), cfg.server.body_limit_bytes);

        tracing::info!(
            issuer = %server.issuer_base(),
            clients = stats.clients_registered,
            users_created = stats.users_created,
            "Identity provider ready"
        );

        Ok(IdpServer {
            addr: self.addr,
            config: cfg,
            app,
            server,
            rotator,
        })
    }
}

impl IdpServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn authorization_server(&self) -> &Arc<AuthorizationServer> {
        &self.server
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.run_with_listener(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` resolves, then stops the
    /// background tasks and closes the connectors.
    pub async fn run_with_listener<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = self.spawn_background(stop_rx);

        tracing::info!("listening on {}", listener.local_addr()?);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await;

        let _ = stop_tx.send(true);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.server.connectors().close().await;
        tracing::info!("shutdown complete");

        served?;
        Ok(())
    }

    fn spawn_background(&self, stop: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let auth = &self.config.auth;
        vec![
            tokio::spawn(self.rotator.clone().run(stop.clone())),
            tokio::spawn(
                Arc::clone(self.server.connectors())
                    .run_health_checks(auth.connector_health_interval, stop.clone()),
            ),
            tokio::spawn(run_session_cleanup(
                Arc::clone(&self.server),
                auth.sessions.cleanup_interval,
                stop,
            )),
        ]
    }
}

/// Sweeps expired sessions and keys on every tick until `shutdown` flips.
async fn run_session_cleanup(
    server: Arc<AuthorizationServer>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match server.sessions().cleanup_expired().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Session cleanup"),
                    Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
