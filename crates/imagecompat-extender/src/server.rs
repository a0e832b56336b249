use crate::handlers::*;
use crate::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Extender server configuration
#[derive(Clone)]
pub struct Config {
    /// Address to listen on
    pub listen_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
        }
    }
}

/// HTTP server speaking the kube-scheduler extender protocol
pub struct ExtenderServer {
    config: Config,
    state: Arc<AppState>,
}

impl ExtenderServer {
    /// Create a new extender server
    pub fn new(config: Config, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Build the router
    fn build_router(&self) -> Router {
        Router::new()
            // Health checks
            .route("/healthz", get(healthz))
            .route("/livez", get(livez))
            .route("/readyz", get(readyz))
            // Extender verbs
            .route("/filter", post(filter))
            // Operator endpoints
            .route("/cache/invalidate", post(invalidate_cache))
            // Add tracing and state
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.build_router();

        info!("Starting scheduler extender on {}", self.config.listen_addr);

        let listener = TcpListener::bind(self.config.listen_addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// Health check endpoint
async fn healthz() -> &'static str {
    "ok"
}

/// Liveness probe
async fn livez() -> &'static str {
    "ok"
}

/// Readiness probe
async fn readyz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagecompat_scheduler::FeatureGroupCache;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_addr.to_string(), "0.0.0.0:8888");
    }

    #[test]
    fn test_build_router() {
        let state = Arc::new(AppState::new(Vec::new(), Arc::new(FeatureGroupCache::new())));

        let server = ExtenderServer::new(Config::default(), state);
        let router = server.build_router();

        assert!(std::mem::size_of_val(&router) > 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let state = Arc::new(AppState::new(Vec::new(), Arc::new(FeatureGroupCache::new())));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = ExtenderServer::new(Config { listen_addr: addr }, state);
        let handle = tokio::spawn(server.run(async move {
            let _ = rx.await;
        }));

        assert_eq!(healthz().await, "ok");
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
