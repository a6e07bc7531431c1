//! Binding API handlers.
//!
//! Every handler authenticates via the `secret` header first. Scoped
//! mutex guards make a leaked app lock impossible on any handler exit
//! path, so the global 500 fallback carries no deadlock caveat.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use flexscale_state::{validate::validate_binding, AppBlueprint, Binding};

use crate::ApiState;

/// Error body for every non-2xx response that carries one.
#[derive(Serialize)]
pub struct ErrorMessage {
    pub error: String,
}

/// Serialized view of one bound app's configuration.
#[derive(Serialize)]
pub struct ResponseApplication {
    #[serde(flatten)]
    blueprint: AppBlueprint,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorMessage {
            error: message.into(),
        }),
    )
        .into_response()
}

fn empty_json(status: StatusCode) -> Response {
    (status, Json(serde_json::json!({}))).into_response()
}

fn authorized(state: &ApiState, headers: &HeaderMap) -> bool {
    headers
        .get("secret")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|secret| secret == state.secret)
}

/// Binding equality for idempotency checks.
///
/// `resource_name` is resolved by the autoscaler after the bind request
/// was formed, so it does not participate.
fn same_binding(a: &Binding, b: &Binding) -> bool {
    a.id == b.id
        && a.resource_id == b.resource_id
        && a.scaler_id == b.scaler_id
        && a.service_id == b.service_id
        && a.context == b.context
        && a.creation_time == b.creation_time
}

/// POST /bindings
pub async fn bind_app(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<Binding>, JsonRejection>,
) -> Response {
    if !authorized(&state, &headers) {
        return empty_json(StatusCode::UNAUTHORIZED);
    }
    let mut binding = match payload {
        Ok(Json(binding)) => binding,
        Err(rejection) => {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text());
        }
    };

    if let Err(e) = validate_binding(&binding) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    if let Some(existing) = state.manager.get(&binding.id).await {
        if same_binding(existing.binding(), &binding) {
            info!(binding = %binding.identifier(), "idempotent bind request");
            return empty_json(StatusCode::OK);
        }
        return error_response(
            StatusCode::CONFLICT,
            "another binding was found with the same id",
        );
    }
    if state.manager.contains_resource_id(&binding.resource_id).await {
        return error_response(
            StatusCode::CONFLICT,
            "another binding was found with the same resource id",
        );
    }

    if state.manager.settings().update_app_name_at_binding {
        match state
            .engine
            .fetch_application_name(&binding.resource_id, &binding.context)
            .await
        {
            Ok(Some(name)) => {
                binding.set_resource_name(name);
            }
            Ok(None) => {
                warn!(binding = %binding.identifier(), "engine did not resolve a resource name");
            }
            Err(e) => {
                warn!(binding = %binding.identifier(), error = %e, "resource name lookup failed");
            }
        }
    }

    let app = state.manager.new_app(binding);
    let response = ResponseApplication {
        blueprint: app.locked_blueprint().await,
    };
    // A racing identical bind loses here; report the conflict.
    if !state.manager.add(app.clone(), false).await {
        return error_response(
            StatusCode::CONFLICT,
            "another binding was found with the same id",
        );
    }
    info!(binding = %app.identifier(), "new binding created");
    (StatusCode::CREATED, Json(response)).into_response()
}

/// DELETE /bindings/{app_id}
pub async fn unbind_app(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(app_id): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return empty_json(StatusCode::UNAUTHORIZED);
    }
    if state.manager.remove(&app_id).await {
        empty_json(StatusCode::OK)
    } else {
        empty_json(StatusCode::GONE)
    }
}

/// Listing wrapper: `{ "bindings": [...] }`.
#[derive(Serialize)]
pub struct BindingList {
    pub bindings: Vec<Binding>,
}

/// GET /bindings
pub async fn list_bindings(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return empty_json(StatusCode::UNAUTHORIZED);
    }
    let bindings = state.manager.list_of_bindings().await;
    Json(BindingList { bindings }).into_response()
}

/// GET /bindings/serviceInstance/{service_id}
pub async fn list_bindings_for_service(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(service_id): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return empty_json(StatusCode::UNAUTHORIZED);
    }
    let bindings = state
        .manager
        .list_of_bindings()
        .await
        .into_iter()
        .filter(|b| b.service_id == service_id)
        .collect();
    Json(BindingList { bindings }).into_response()
}

/// GET /bindings/{app_id}
pub async fn get_binding(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(app_id): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return empty_json(StatusCode::UNAUTHORIZED);
    }
    match state.manager.get(&app_id).await {
        Some(app) => Json(ResponseApplication {
            blueprint: app.locked_blueprint().await,
        })
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "binding not found"),
    }
}
