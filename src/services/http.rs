use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request, State},
    http::{request::Parts, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

use super::auth::{bearer_token, require_role, Authenticator, MISSING_TOKEN};
use super::realtime::{self, SessionRegistry};
use super::{ServiceChannels, ServiceError};
use crate::models::users::{Identity, Role};

pub mod categories;
pub mod expenses;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub channels: ServiceChannels,
    pub authenticator: Arc<Authenticator>,
    pub sessions: Arc<SessionRegistry>,
    pub auth_timeout: Duration,
    pub expose_stack: bool,
}

impl AppState {
    pub fn fail(&self, error: ServiceError) -> ApiError {
        ApiError {
            error,
            expose_stack: self.expose_stack,
        }
    }
}

/// Success envelope: `{success: true, message, data}`.
pub struct ApiResponse<T> {
    status: StatusCode,
    message: &'static str,
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: &'static str, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message,
            data: Some(data),
        }
    }

    pub fn created(message: &'static str, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn empty(message: &'static str) -> Self {
        Self {
            status: StatusCode::OK,
            message,
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = json!({
            "success": true,
            "message": self.message,
            "data": self.data,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Failure envelope: `{success: false, message, stack}`.
#[derive(Debug)]
pub struct ApiError {
    error: ServiceError,
    expose_stack: bool,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.error {
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InterpretationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Persistence(_) | ServiceError::Communication(..) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed with {}: {}", status, self.error);
        } else {
            log::debug!("Request rejected with {}: {}", status, self.error);
        }

        let stack = self.expose_stack.then(|| format!("{:?}", self.error));
        let body = json!({
            "success": false,
            "message": self.error.public_message(),
            "stack": stack,
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// A caller with a verified token and a local account.
pub struct Authenticated(pub Identity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            state.fail(ServiceError::Unauthenticated(MISSING_TOKEN.to_string()))
        })?;

        state
            .authenticator
            .authenticate(token)
            .await
            .map(Authenticated)
            .map_err(|e| state.fail(e))
    }
}

/// A caller with a verified token who may not have a local account yet.
pub struct VerifiedSubject(pub String);

impl FromRequestParts<AppState> for VerifiedSubject {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            state.fail(ServiceError::Unauthenticated(MISSING_TOKEN.to_string()))
        })?;

        state
            .authenticator
            .verify_subject(token)
            .await
            .map(VerifiedSubject)
            .map_err(|e| state.fail(e))
    }
}

pub struct SuperAdmin(pub Identity);

impl FromRequestParts<AppState> for SuperAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Authenticated(identity) = Authenticated::from_request_parts(parts, state).await?;
        require_role(&identity, Role::SuperAdmin).map_err(|e| state.fail(e))?;

        Ok(SuperAdmin(identity))
    }
}

/// `Json` whose decode failures use the failure envelope.
pub struct ValidJson<T>(pub T);

impl<T> FromRequest<AppState> for ValidJson<T>
where
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(state.fail(json_problem(rejection))),
        }
    }
}

fn json_problem(rejection: JsonRejection) -> ServiceError {
    ServiceError::Validation(rejection.body_text())
}

async fn not_found(State(state): State<AppState>, uri: Uri) -> ApiError {
    state.fail(ServiceError::NotFound(format!(
        "Can't find {} on this server!",
        uri.path()
    )))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/users", post(users::register))
        .route("/api/v1/users/me", get(users::current_user))
        .route("/api/v1/admin/users/all", get(users::list_users))
        .route("/api/v1/categories", get(categories::list_categories))
        .route("/api/v1/admin/categories", post(categories::create_categories))
        .route("/api/v1/expenses", post(expenses::create_expense))
        .route("/api/v1/expenses/user/{user_id}", get(expenses::list_expenses))
        .route(
            "/api/v1/expenses/{expense_id}",
            delete(expenses::delete_expense).patch(expenses::update_expense),
        )
        .route("/ws", get(realtime::ws_handler))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(listen: &str, state: AppState) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
