pub mod account;
pub mod attendance;
pub mod courses;
pub mod extract;
pub mod requests;

use std::sync::Arc;

use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::time::Instant;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;

use crate::auth::SessionAuthority;
use crate::config::AppConfig;
use crate::err::handler404;
use crate::store::Store;

/// Requests served at once before new ones wait for a slot.
const MAX_CONCURRENT_REQUESTS: usize = 256;

/// Handed to every handler. Holds no per-request state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub authority: SessionAuthority,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self {
            authority: SessionAuthority::new(&config.auth),
            store,
            config: Arc::new(config),
        }
    }
}

async fn log_requests<B>(req: Request<B>, next: Next<B>) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;
    log::info!(
        "{} {} -> {} ({:?})",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/register", post(account::register))
        .route("/login", post(account::login))
        .route("/session", get(account::session_status))
        .route("/session/resume", post(account::resume))
        .route("/logout", post(account::logout))
        .route("/courses", post(courses::create_course))
        .route("/courses/faculty", get(courses::faculty_courses))
        .route("/courses/student", get(courses::student_courses))
        .route("/courses/search", get(courses::search_courses))
        .route(
            "/requests",
            get(requests::pending_requests).post(requests::request_join),
        )
        .route("/requests/approve", post(requests::approve_request))
        .route("/requests/reject", post(requests::reject_request))
        .route("/attendance/sessions", post(attendance::create_session))
        .route("/attendance/sessions/end", post(attendance::end_session))
        .route("/attendance/check-in", post(attendance::check_in))
        .route("/attendance/report", get(attendance::report))
        .fallback(handler404)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_requests))
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS)),
        )
        .with_state(state)
}
