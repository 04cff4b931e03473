use crate::models::categories::Category;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::CategoryStore;

#[derive(Clone)]
pub struct CategoryRepository {
    conn: PgPool,
}

impl CategoryRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CategoryStore for CategoryRepository {
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, anyhow::Error> {
        let category =
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.conn)
                .await?;

        Ok(category)
    }

    async fn find_category_by_id(&self, id: &str) -> Result<Option<Category>, anyhow::Error> {
        let category =
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.conn)
                .await?;

        Ok(category)
    }

    async fn find_categories_by_lowercase_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Category>, anyhow::Error> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name FROM categories WHERE lower(name) = ANY($1)",
        )
        .bind(names)
        .fetch_all(&self.conn)
        .await?;

        Ok(categories)
    }

    async fn insert_categories(&self, names: &[String]) -> Result<Vec<Category>, anyhow::Error> {
        let ids: Vec<String> = names
            .iter()
            .map(|_| Uuid::new_v4().hyphenated().to_string())
            .collect();

        let categories = sqlx::query_as::<_, Category>(
            r#"
                INSERT INTO categories (id, name)
                SELECT * FROM UNNEST($1::text[], $2::text[])
                ON CONFLICT DO NOTHING
                RETURNING id, name
            "#,
        )
        .bind(ids)
        .bind(names)
        .fetch_all(&self.conn)
        .await?;

        Ok(categories)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, anyhow::Error> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name")
                .fetch_all(&self.conn)
                .await?;

        Ok(categories)
    }
}
