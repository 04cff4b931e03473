use async_trait::async_trait;

use crate::models::{
    categories::Category,
    expenses::{Expense, ExpenseChanges, ExpenseDetails, ExpenseFilter, NewExpense},
    messages::Message,
    users::{User, UserRecord},
};

pub mod categories;
pub mod expenses;
pub mod identity;
pub mod interpretation;
pub mod messages;
pub mod users;

#[cfg(test)]
pub(crate) mod memory;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: UserRecord) -> Result<User, anyhow::Error>;

    async fn find_user_by_external_id(
        &self,
        external_auth_id: &str,
    ) -> Result<Option<User>, anyhow::Error>;

    /// True when either the external subject or the email is already taken.
    async fn user_exists(&self, external_auth_id: &str, email: &str)
        -> Result<bool, anyhow::Error>;

    async fn list_users(&self) -> Result<Vec<User>, anyhow::Error>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Case-sensitive exact match.
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, anyhow::Error>;

    async fn find_category_by_id(&self, id: &str) -> Result<Option<Category>, anyhow::Error>;

    /// `names` must already be lowercase; matching ignores stored case.
    async fn find_categories_by_lowercase_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Category>, anyhow::Error>;

    /// Inserts the given names, silently skipping any that collide.
    async fn insert_categories(&self, names: &[String]) -> Result<Vec<Category>, anyhow::Error>;

    async fn list_categories(&self) -> Result<Vec<Category>, anyhow::Error>;
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn create_expense(
        &self,
        user_id: &str,
        expense: &NewExpense,
    ) -> Result<ExpenseDetails, anyhow::Error>;

    /// Returns one page plus the total number of matching rows, read in a
    /// single transaction.
    async fn list_expenses(
        &self,
        filter: &ExpenseFilter,
    ) -> Result<(Vec<ExpenseDetails>, i64), anyhow::Error>;

    async fn find_expense(&self, id: &str) -> Result<Option<Expense>, anyhow::Error>;

    async fn update_expense(
        &self,
        id: &str,
        changes: &ExpenseChanges,
    ) -> Result<ExpenseDetails, anyhow::Error>;

    async fn delete_expense(&self, id: &str) -> Result<(), anyhow::Error>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, user_id: &str, content: &str) -> Result<Message, anyhow::Error>;

    /// Newest first.
    async fn list_messages(&self, user_id: &str, limit: i64) -> Result<Vec<Message>, anyhow::Error>;
}
