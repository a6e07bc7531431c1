//! flexscale-api — the binding management API.
//!
//! Secret-authenticated REST surface for the service broker: create
//! and delete bindings, list them globally or per service instance.
//! Handlers talk to the registry only; metric flow and scaling stay in
//! `flexscale-core`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/bindings` | Bind an application |
//! | GET | `/bindings` | List all bindings |
//! | GET | `/bindings/{app_id}` | Get one binding's configuration |
//! | DELETE | `/bindings/{app_id}` | Unbind an application |
//! | GET | `/bindings/serviceInstance/{service_id}` | Bindings of one service instance |

pub mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use flexscale_core::ScalableAppManager;
use flexscale_engine::ScalingEngineClient;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<ScalableAppManager>,
    pub engine: Arc<ScalingEngineClient>,
    /// Secret every request must present in the `secret` header.
    pub secret: String,
}

/// Build the management API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/bindings", get(handlers::list_bindings).post(handlers::bind_app))
        .route(
            "/bindings/{app_id}",
            get(handlers::get_binding).delete(handlers::unbind_app),
        )
        .route(
            "/bindings/serviceInstance/{service_id}",
            get(handlers::list_bindings_for_service),
        )
        .with_state(state)
}
