use crate::models::users::{User, UserRecord};

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::UserStore;

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn insert_user(&self, user: UserRecord) -> Result<User, anyhow::Error> {
        let user_id = Uuid::new_v4().hyphenated().to_string();

        let user = sqlx::query_as::<_, User>(
            r#"
                INSERT INTO users (id, external_auth_id, email, first_name, last_name, role)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, external_auth_id, email, first_name, last_name, role, created_at
            "#,
        )
        .bind(user_id)
        .bind(user.external_auth_id)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.role.as_str())
        .fetch_one(&self.conn)
        .await?;

        Ok(user)
    }

    async fn find_user_by_external_id(
        &self,
        external_auth_id: &str,
    ) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, external_auth_id, email, first_name, last_name, role, created_at
            FROM users WHERE external_auth_id = $1"#,
        )
        .bind(external_auth_id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn user_exists(
        &self,
        external_auth_id: &str,
        email: &str,
    ) -> Result<bool, anyhow::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE external_auth_id = $1 OR lower(email) = lower($2))",
        )
        .bind(external_auth_id)
        .bind(email)
        .fetch_one(&self.conn)
        .await?;

        Ok(exists)
    }

    async fn list_users(&self) -> Result<Vec<User>, anyhow::Error> {
        let users = sqlx::query_as::<_, User>(
            r#"SELECT id, external_auth_id, email, first_name, last_name, role, created_at
            FROM users ORDER BY created_at DESC"#,
        )
        .fetch_all(&self.conn)
        .await?;

        Ok(users)
    }
}
