//! In-memory stores used by unit tests in place of Postgres.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use super::{CategoryStore, ExpenseStore, MessageStore, UserStore};
use crate::models::{
    categories::{Category, CategoryName},
    expenses::{Expense, ExpenseChanges, ExpenseDetails, ExpenseFilter, NewExpense, SortOrder},
    messages::Message,
    users::{User, UserRecord},
};

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Vec<User>>,
    categories: Mutex<Vec<Category>>,
    expenses: Mutex<Vec<Expense>>,
    messages: Mutex<Vec<Message>>,
    fail_messages: AtomicBool,
    fail_expenses: AtomicBool,
    fail_categories: AtomicBool,
}

fn new_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(names: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut categories = store.categories.lock().unwrap();
            for name in names {
                categories.push(Category {
                    id: new_id(),
                    name: name.to_string(),
                });
            }
        }
        store
    }

    /// Subjects are unique, so seeding the same subject again returns the
    /// existing user.
    pub fn add_user(&self, record: UserRecord) -> User {
        let mut users = self.users.lock().unwrap();
        if let Some(existing) = users
            .iter()
            .find(|u| u.external_auth_id == record.external_auth_id)
        {
            return existing.clone();
        }

        let user = User {
            id: new_id(),
            external_auth_id: record.external_auth_id,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            role: record.role,
            created_at: Utc::now(),
        };
        users.push(user.clone());
        user
    }

    /// Inserts an expense with an explicit age, for ordering and date filters.
    pub fn add_expense_aged(
        &self,
        user_id: &str,
        category_name: &str,
        amount: rust_decimal::Decimal,
        age: Duration,
    ) -> Expense {
        let category = self.category_named(category_name).expect("seeded category");
        let created_at = Utc::now() - age;
        let expense = Expense {
            id: new_id(),
            user_id: user_id.to_string(),
            category_id: category.id,
            amount,
            description: String::new(),
            created_at,
            updated_at: created_at,
        };
        self.expenses.lock().unwrap().push(expense.clone());
        expense
    }

    pub fn category_named(&self, name: &str) -> Option<Category> {
        self.categories
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn fail_message_writes(&self) {
        self.fail_messages.store(true, Ordering::SeqCst);
    }

    pub fn fail_expense_writes(&self) {
        self.fail_expenses.store(true, Ordering::SeqCst);
    }

    pub fn fail_category_reads(&self) {
        self.fail_categories.store(true, Ordering::SeqCst);
    }

    pub fn expense_count(&self) -> usize {
        self.expenses.lock().unwrap().len()
    }

    pub fn category_count(&self) -> usize {
        self.categories.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    fn details(&self, expense: &Expense) -> Result<ExpenseDetails, anyhow::Error> {
        let name = self
            .categories
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == expense.category_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| anyhow!("foreign key violation on category {}", expense.category_id))?;

        Ok(ExpenseDetails {
            id: expense.id.clone(),
            amount: expense.amount,
            description: expense.description.clone(),
            category: CategoryName { name },
            created_at: expense.created_at,
            updated_at: expense.updated_at,
        })
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: UserRecord) -> Result<User, anyhow::Error> {
        Ok(self.add_user(user))
    }

    async fn find_user_by_external_id(
        &self,
        external_auth_id: &str,
    ) -> Result<Option<User>, anyhow::Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.external_auth_id == external_auth_id)
            .cloned())
    }

    async fn user_exists(
        &self,
        external_auth_id: &str,
        email: &str,
    ) -> Result<bool, anyhow::Error> {
        Ok(self.users.lock().unwrap().iter().any(|u| {
            u.external_auth_id == external_auth_id || u.email.eq_ignore_ascii_case(email)
        }))
    }

    async fn list_users(&self) -> Result<Vec<User>, anyhow::Error> {
        Ok(self.users.lock().unwrap().clone())
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, anyhow::Error> {
        if self.fail_categories.load(Ordering::SeqCst) {
            bail!("connection reset while reading categories");
        }
        Ok(self.category_named(name))
    }

    async fn find_category_by_id(&self, id: &str) -> Result<Option<Category>, anyhow::Error> {
        Ok(self
            .categories
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_categories_by_lowercase_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Category>, anyhow::Error> {
        Ok(self
            .categories
            .lock()
            .unwrap()
            .iter()
            .filter(|c| names.contains(&c.name.to_lowercase()))
            .cloned()
            .collect())
    }

    async fn insert_categories(&self, names: &[String]) -> Result<Vec<Category>, anyhow::Error> {
        let mut categories = self.categories.lock().unwrap();
        let mut created = Vec::new();

        for name in names {
            if categories.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
                continue;
            }
            let category = Category {
                id: new_id(),
                name: name.clone(),
            };
            categories.push(category.clone());
            created.push(category);
        }

        Ok(created)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, anyhow::Error> {
        Ok(self.categories.lock().unwrap().clone())
    }
}

#[async_trait]
impl ExpenseStore for MemoryStore {
    async fn create_expense(
        &self,
        user_id: &str,
        expense: &NewExpense,
    ) -> Result<ExpenseDetails, anyhow::Error> {
        if self.fail_expenses.load(Ordering::SeqCst) {
            bail!("deadlock detected while inserting expense");
        }

        let now = Utc::now();
        let expense = Expense {
            id: new_id(),
            user_id: user_id.to_string(),
            category_id: expense.category_id.clone(),
            amount: expense.amount,
            description: expense.description.clone(),
            created_at: now,
            updated_at: now,
        };
        let details = self.details(&expense)?;
        self.expenses.lock().unwrap().push(expense);

        Ok(details)
    }

    async fn list_expenses(
        &self,
        filter: &ExpenseFilter,
    ) -> Result<(Vec<ExpenseDetails>, i64), anyhow::Error> {
        let mut matching: Vec<Expense> = self
            .expenses
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == filter.user_id)
            .filter(|e| filter.category_id.as_ref().map_or(true, |id| &e.category_id == id))
            .filter(|e| filter.created.map_or(true, |range| range.contains(&e.created_at)))
            .cloned()
            .collect();

        matching.sort_by_key(|e| e.created_at);
        if filter.order == SortOrder::Desc {
            matching.reverse();
        }

        let total = matching.len() as i64;
        let page = matching
            .iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .map(|e| self.details(e))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((page, total))
    }

    async fn find_expense(&self, id: &str) -> Result<Option<Expense>, anyhow::Error> {
        Ok(self
            .expenses
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn update_expense(
        &self,
        id: &str,
        changes: &ExpenseChanges,
    ) -> Result<ExpenseDetails, anyhow::Error> {
        let updated = {
            let mut expenses = self.expenses.lock().unwrap();
            let expense = expenses
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| anyhow!("expense {} not found", id))?;

            if let Some(amount) = changes.amount {
                expense.amount = amount;
            }
            if let Some(description) = &changes.description {
                expense.description = description.clone();
            }
            if let Some(category_id) = &changes.category_id {
                expense.category_id = category_id.clone();
            }
            expense.updated_at = Utc::now();
            expense.clone()
        };

        self.details(&updated)
    }

    async fn delete_expense(&self, id: &str) -> Result<(), anyhow::Error> {
        self.expenses.lock().unwrap().retain(|e| e.id != id);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, user_id: &str, content: &str) -> Result<Message, anyhow::Error> {
        if self.fail_messages.load(Ordering::SeqCst) {
            bail!("disk full while appending message");
        }

        let message = Message {
            id: new_id(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(message.clone());

        Ok(message)
    }

    async fn list_messages(&self, user_id: &str, limit: i64) -> Result<Vec<Message>, anyhow::Error> {
        let mut messages: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();

        // Insertion order breaks ties between equal timestamps.
        messages.reverse();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit as usize);

        Ok(messages)
    }
}
