use axum::extract::State;

use super::{ApiResponse, ApiResult, AppState, Authenticated, SuperAdmin, ValidJson, VerifiedSubject};
use crate::models::users::{NewUser, User};
use crate::services::{dispatch, users::UserRequest};

pub async fn register(
    State(state): State<AppState>,
    VerifiedSubject(subject_id): VerifiedSubject,
    ValidJson(user): ValidJson<NewUser>,
) -> ApiResult<User> {
    let user = dispatch(&state.channels.users, "user", |response| UserRequest::Register {
        subject_id,
        user,
        response,
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::created("User registered successfully", user))
}

pub async fn current_user(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
) -> ApiResult<User> {
    let user = dispatch(&state.channels.users, "user", |response| UserRequest::GetUser {
        external_auth_id: identity.subject_id,
        response,
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::ok("User details fetched successfully", user))
}

pub async fn list_users(
    State(state): State<AppState>,
    SuperAdmin(_): SuperAdmin,
) -> ApiResult<Vec<User>> {
    let users = dispatch(&state.channels.users, "user", |response| {
        UserRequest::ListUsers { response }
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::ok("Users fetched successfully", users))
}
