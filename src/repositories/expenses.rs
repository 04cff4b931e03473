use crate::models::expenses::{
    Expense, ExpenseChanges, ExpenseDetails, ExpenseFilter, ExpenseRow, NewExpense,
};

use anyhow::bail;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::ExpenseStore;

const EXPENSE_WITH_CATEGORY: &str = r#"
    SELECT written.id, written.amount, written.description,
           categories.name AS category_name, written.created_at, written.updated_at
    FROM written JOIN categories ON categories.id = written.category_id
"#;

#[derive(Clone)]
pub struct ExpenseRepository {
    conn: PgPool,
}

impl ExpenseRepository {
    pub fn new(conn: PgPool) -> Self {
        ExpenseRepository { conn }
    }
}

fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, filter: &ExpenseFilter) {
    builder
        .push(" WHERE expenses.user_id = ")
        .push_bind(filter.user_id.clone());

    if let Some(category_id) = &filter.category_id {
        builder
            .push(" AND expenses.category_id = ")
            .push_bind(category_id.clone());
    }

    if let Some(range) = &filter.created {
        builder
            .push(" AND expenses.created_at >= ")
            .push_bind(range.start)
            .push(" AND expenses.created_at < ")
            .push_bind(range.end);
    }
}

#[async_trait]
impl ExpenseStore for ExpenseRepository {
    async fn create_expense(
        &self,
        user_id: &str,
        expense: &NewExpense,
    ) -> Result<ExpenseDetails, anyhow::Error> {
        let expense_id = Uuid::new_v4().hyphenated().to_string();

        // Single statement, so the insert and the category join commit together.
        let row = sqlx::query_as::<_, ExpenseRow>(&format!(
            r#"
                WITH written AS (
                    INSERT INTO expenses (id, user_id, category_id, amount, description)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING *
                )
                {EXPENSE_WITH_CATEGORY}
            "#
        ))
        .bind(expense_id)
        .bind(user_id)
        .bind(&expense.category_id)
        .bind(expense.amount)
        .bind(&expense.description)
        .fetch_one(&self.conn)
        .await?;

        Ok(row.into())
    }

    async fn list_expenses(
        &self,
        filter: &ExpenseFilter,
    ) -> Result<(Vec<ExpenseDetails>, i64), anyhow::Error> {
        let mut tx = self.conn.begin().await?;

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(1) FROM expenses");
        push_conditions(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await?;

        let mut page_query = QueryBuilder::<Postgres>::new(
            r#"SELECT expenses.id, expenses.amount, expenses.description,
                categories.name AS category_name, expenses.created_at, expenses.updated_at
            FROM expenses JOIN categories ON categories.id = expenses.category_id"#,
        );
        push_conditions(&mut page_query, filter);
        page_query
            .push(" ORDER BY expenses.created_at ")
            .push(filter.order.as_sql())
            .push(" LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let rows: Vec<ExpenseRow> = page_query
            .build_query_as::<ExpenseRow>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((rows.into_iter().map(ExpenseDetails::from).collect(), total))
    }

    async fn find_expense(&self, id: &str) -> Result<Option<Expense>, anyhow::Error> {
        let expense = sqlx::query_as::<_, Expense>(
            r#"SELECT id, user_id, category_id, amount, description, created_at, updated_at
            FROM expenses WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(expense)
    }

    async fn update_expense(
        &self,
        id: &str,
        changes: &ExpenseChanges,
    ) -> Result<ExpenseDetails, anyhow::Error> {
        let row = sqlx::query_as::<_, ExpenseRow>(&format!(
            r#"
                WITH written AS (
                    UPDATE expenses SET
                        amount = COALESCE($2, amount),
                        description = COALESCE($3, description),
                        category_id = COALESCE($4, category_id),
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = $1
                    RETURNING *
                )
                {EXPENSE_WITH_CATEGORY}
            "#
        ))
        .bind(id)
        .bind(changes.amount)
        .bind(&changes.description)
        .bind(&changes.category_id)
        .fetch_optional(&self.conn)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => bail!("Expense {} vanished during update", id),
        }
    }

    async fn delete_expense(&self, id: &str) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(())
    }
}
