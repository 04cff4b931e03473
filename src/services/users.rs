use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use validator::ValidateEmail;

use super::{RequestHandler, Service, ServiceError};
use crate::models::users::{NewUser, Role, User, UserRecord};
use crate::repositories::UserStore;

pub enum UserRequest {
    Register {
        subject_id: String,
        user: NewUser,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    GetUser {
        external_auth_id: String,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    ListUsers {
        response: oneshot::Sender<Result<Vec<User>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: Arc<dyn UserStore>,
}

/// Collects every problem with a registration body, not only the first.
pub fn validate_new_user(user: &NewUser) -> Result<UserRecordDraft, ServiceError> {
    let email = user.email.trim();
    let first_name = user.first_name.trim();
    let last_name = user.last_name.trim();
    let mut problems = Vec::new();

    if email.is_empty() {
        problems.push("Email is required");
    } else if !email.validate_email() {
        problems.push("Invalid email format");
    }
    if first_name.is_empty() {
        problems.push("First name is required");
    }
    if last_name.is_empty() {
        problems.push("Last name is required");
    }

    if problems.is_empty() {
        Ok(UserRecordDraft {
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
    } else {
        Err(ServiceError::Validation(problems.join(", ")))
    }
}

#[derive(Debug)]
pub struct UserRecordDraft {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl UserRequestHandler {
    pub fn new(repository: Arc<dyn UserStore>) -> Self {
        UserRequestHandler { repository }
    }

    async fn register(&self, subject_id: String, user: NewUser) -> Result<User, ServiceError> {
        let draft = validate_new_user(&user)?;

        let exists = self
            .repository
            .user_exists(&subject_id, &draft.email)
            .await
            .map_err(|e| ServiceError::persistence("User existence check", e))?;
        if exists {
            return Err(ServiceError::Validation("User already exists".to_string()));
        }

        let user = self
            .repository
            .insert_user(UserRecord {
                external_auth_id: subject_id,
                email: draft.email,
                first_name: draft.first_name,
                last_name: draft.last_name,
                role: Role::User,
            })
            .await
            .map_err(|e| ServiceError::persistence("User insert", e))?;

        log::info!("Registered user {}", user.id);
        Ok(user)
    }

    async fn get_user(&self, external_auth_id: &str) -> Result<User, ServiceError> {
        self.repository
            .find_user_by_external_id(external_auth_id)
            .await
            .map_err(|e| ServiceError::persistence("User lookup", e))?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        self.repository
            .list_users()
            .await
            .map_err(|e| ServiceError::persistence("User listing", e))
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register {
                subject_id,
                user,
                response,
            } => {
                let user = self.register(subject_id, user).await;
                let _ = response.send(user);
            }
            UserRequest::GetUser {
                external_auth_id,
                response,
            } => {
                let user = self.get_user(&external_auth_id).await;
                let _ = response.send(user);
            }
            UserRequest::ListUsers { response } => {
                let users = self.list_users().await;
                let _ = response.send(users);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryStore;

    fn new_user(email: &str, first: &str, last: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    #[test]
    fn reports_all_missing_fields() {
        let error = validate_new_user(&new_user("", " ", "")).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Email is required, First name is required, Last name is required"
        );
    }

    #[test]
    fn checks_email_shape() {
        for email in ["plain", "a@@b.com", "a b@c.com", "@c.com", "a@.com", "ada@"] {
            assert!(
                validate_new_user(&new_user(email, "Ada", "Lovelace")).is_err(),
                "{email} should be rejected"
            );
        }
        assert!(validate_new_user(&new_user("ada@example.com", "Ada", "Lovelace")).is_ok());
    }

    #[tokio::test]
    async fn registers_once_per_subject_and_email() {
        let handler = UserRequestHandler::new(Arc::new(MemoryStore::new()));

        let user = handler
            .register("sub-1".to_string(), new_user("ada@example.com", "Ada", "Lovelace"))
            .await
            .unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.external_auth_id, "sub-1");

        let same_subject = handler
            .register("sub-1".to_string(), new_user("other@example.com", "Ada", "L"))
            .await
            .unwrap_err();
        let same_email = handler
            .register("sub-2".to_string(), new_user("ADA@example.com", "Ada", "L"))
            .await
            .unwrap_err();

        assert_eq!(same_subject.to_string(), "User already exists");
        assert_eq!(same_email.to_string(), "User already exists");
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let handler = UserRequestHandler::new(Arc::new(MemoryStore::new()));
        let error = handler.get_user("nobody").await.unwrap_err();
        assert!(matches!(error, ServiceError::NotFound(_)));
    }
}
