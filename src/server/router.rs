use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::user::user_router;
use crate::auth::{IdentityProvider, IdentitySessions, TokenIdentityProvider};
use crate::exec::{ExecutionSlots, Executor};
use crate::notify::{LogNotifier, Notifier};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Sign-out fan-out to open live sessions.
    pub sessions: IdentitySessions,
    pub notifier: Arc<dyn Notifier>,
    /// Remote execution. Run requests are rejected when unset.
    pub executor: Option<Arc<dyn Executor>>,
    pub executions: ExecutionSlots,
    /// Base URL used in invitation links.
    pub public_base_url: String,
}

impl AppState {
    /// Token-backed identities, log-only notifications and no executor.
    pub fn new(store: Arc<dyn Store>, public_base_url: impl Into<String>) -> Self {
        Self {
            identity: Arc::new(TokenIdentityProvider::new(Arc::clone(&store))),
            sessions: IdentitySessions::new(),
            store,
            notifier: Arc::new(LogNotifier),
            executor: None,
            executions: ExecutionSlots::new(),
            public_base_url: public_base_url.into(),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", user_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
