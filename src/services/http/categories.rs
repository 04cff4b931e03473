use axum::extract::State;

use super::{ApiResponse, ApiResult, AppState, Authenticated, SuperAdmin, ValidJson};
use crate::models::categories::{Category, NewCategories};
use crate::services::{categories::CategoryRequest, dispatch};

pub async fn list_categories(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
) -> ApiResult<Vec<Category>> {
    let categories = dispatch(&state.channels.categories, "category", |response| {
        CategoryRequest::ListCategories { response }
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::ok("Categories fetched successfully", categories))
}

pub async fn create_categories(
    State(state): State<AppState>,
    SuperAdmin(_): SuperAdmin,
    ValidJson(body): ValidJson<NewCategories>,
) -> ApiResult<Vec<Category>> {
    let created = dispatch(&state.channels.categories, "category", |response| {
        CategoryRequest::CreateCategories {
            names: body.categories,
            response,
        }
    })
    .await
    .map_err(|e| state.fail(e))?;

    Ok(ApiResponse::created("Categories created successfully", created))
}
