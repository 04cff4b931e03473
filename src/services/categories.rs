use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::categories::Category;
use crate::repositories::CategoryStore;

pub enum CategoryRequest {
    CreateCategories {
        names: Option<Vec<String>>,
        response: oneshot::Sender<Result<Vec<Category>, ServiceError>>,
    },
    ListCategories {
        response: oneshot::Sender<Result<Vec<Category>, ServiceError>>,
    },
}

/// "fOOD" -> "Food".
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Trims, validates and lowercases the submitted names, dropping
/// case-insensitive duplicates while keeping first-seen order.
pub fn unique_lowercase(names: Option<Vec<String>>) -> Result<Vec<String>, ServiceError> {
    let names = match names {
        Some(names) if !names.is_empty() => names,
        _ => {
            return Err(ServiceError::Validation(
                "At least one category is required".to_string(),
            ))
        }
    };

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::Validation(
                "Category name cannot be empty".to_string(),
            ));
        }

        let lowered = trimmed.to_lowercase();
        if seen.insert(lowered.clone()) {
            unique.push(lowered);
        }
    }

    Ok(unique)
}

#[derive(Clone)]
pub struct CategoryRequestHandler {
    repository: Arc<dyn CategoryStore>,
}

impl CategoryRequestHandler {
    pub fn new(repository: Arc<dyn CategoryStore>) -> Self {
        Self { repository }
    }

    async fn create_categories(
        &self,
        names: Option<Vec<String>>,
    ) -> Result<Vec<Category>, ServiceError> {
        let requested = unique_lowercase(names)?;

        let existing: HashSet<String> = self
            .repository
            .find_categories_by_lowercase_names(&requested)
            .await
            .map_err(|e| ServiceError::persistence("Category lookup", e))?
            .into_iter()
            .map(|c| c.name.to_lowercase())
            .collect();

        let to_insert: Vec<String> = requested
            .iter()
            .filter(|name| !existing.contains(*name))
            .map(|name| capitalize(name))
            .collect();

        if to_insert.is_empty() {
            return Err(ServiceError::Validation(
                "All categories already exist".to_string(),
            ));
        }

        let created = self
            .repository
            .insert_categories(&to_insert)
            .await
            .map_err(|e| ServiceError::persistence("Category insert", e))?;

        // A concurrent request can insert the same names after the lookup.
        if created.is_empty() {
            return Err(ServiceError::Validation(
                "All categories already exist".to_string(),
            ));
        }

        log::info!("Created {} categories", created.len());
        Ok(created)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, ServiceError> {
        self.repository
            .list_categories()
            .await
            .map_err(|e| ServiceError::persistence("Category listing", e))
    }
}

#[async_trait]
impl RequestHandler<CategoryRequest> for CategoryRequestHandler {
    async fn handle_request(&self, request: CategoryRequest) {
        match request {
            CategoryRequest::CreateCategories { names, response } => {
                let created = self.create_categories(names).await;
                let _ = response.send(created);
            }
            CategoryRequest::ListCategories { response } => {
                let categories = self.list_categories().await;
                let _ = response.send(categories);
            }
        }
    }
}

pub struct CategoryService;

impl CategoryService {
    pub fn new() -> Self {
        CategoryService {}
    }
}

#[async_trait]
impl Service<CategoryRequest, CategoryRequestHandler> for CategoryService {}
