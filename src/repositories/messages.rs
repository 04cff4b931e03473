use crate::models::messages::Message;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::MessageStore;

#[derive(Clone)]
pub struct MessageRepository {
    conn: PgPool,
}

impl MessageRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn create_message(&self, user_id: &str, content: &str) -> Result<Message, anyhow::Error> {
        let message_id = Uuid::new_v4().hyphenated().to_string();

        let message = sqlx::query_as::<_, Message>(
            r#"
                INSERT INTO messages (id, user_id, content)
                VALUES ($1, $2, $3)
                RETURNING id, user_id, content, created_at
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.conn)
        .await?;

        Ok(message)
    }

    async fn list_messages(&self, user_id: &str, limit: i64) -> Result<Vec<Message>, anyhow::Error> {
        let messages = sqlx::query_as::<_, Message>(
            r#"SELECT id, user_id, content, created_at FROM messages
            WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(messages)
    }
}
