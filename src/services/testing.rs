//! Scripted collaborators for service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::users::{Role, UserRecord};
use crate::models::verdict::{ExpenseCandidate, InterpretationVerdict};
use crate::repositories::identity::{TokenVerifier, VerifyError};
use crate::repositories::interpretation::{InterpretationError, Interpreter};
use crate::repositories::memory::MemoryStore;
use crate::services::auth::Authenticator;
use crate::services::http::AppState;
use crate::services::realtime::SessionRegistry;
use crate::services::{spawn_services, ChatOptions, Dependencies};

pub const USER_TOKEN: &str = "user-token";
pub const ADMIN_TOKEN: &str = "admin-token";
/// Verifies, but has no local account.
pub const FRESH_TOKEN: &str = "fresh-token";

pub fn user_record(subject_id: &str, role: Role) -> UserRecord {
    UserRecord {
        external_auth_id: subject_id.to_string(),
        email: format!("{subject_id}@example.com"),
        first_name: "Test".to_string(),
        last_name: subject_id.to_string(),
        role,
    }
}

/// Accepts a fixed set of tokens. Anything else is an invalid token.
pub struct StaticVerifier {
    tokens: HashMap<String, String>,
}

impl StaticVerifier {
    pub const OUTAGE_TOKEN: &'static str = "provider-outage";

    pub fn new(tokens: &[(&str, &str)]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|(token, subject)| (token.to_string(), subject.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<String, VerifyError> {
        if token == Self::OUTAGE_TOKEN {
            return Err(VerifyError::ProviderUnavailable("connection refused".to_string()));
        }

        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| VerifyError::InvalidToken("INVALID_ID_TOKEN".to_string()))
    }
}

enum Script {
    Answer(InterpretationVerdict),
    Unavailable,
    Stall,
}

/// Gives the same answer to every message and counts the calls.
pub struct ScriptedInterpreter {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedInterpreter {
    fn with(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn expense(category: &str, amount: Decimal, description: &str) -> Self {
        Self::with(Script::Answer(InterpretationVerdict::Expense(ExpenseCandidate {
            category: category.to_string(),
            amount,
            description: description.to_string(),
        })))
    }

    pub fn rejecting(reason: &str) -> Self {
        Self::with(Script::Answer(InterpretationVerdict::rejected(reason)))
    }

    pub fn unavailable() -> Self {
        Self::with(Script::Unavailable)
    }

    /// Never answers within any reasonable test timeout.
    pub fn stalling() -> Self {
        Self::with(Script::Stall)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn interpret(&self, _text: &str) -> Result<InterpretationVerdict, InterpretationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.script {
            Script::Answer(verdict) => Ok(verdict.clone()),
            Script::Unavailable => Err(InterpretationError::Unavailable(
                "503 Service Unavailable".to_string(),
            )),
            Script::Stall => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(InterpretationError::Unavailable("stalled".to_string()))
            }
        }
    }
}

/// Full application state over `store`, with running services. Seeds a
/// regular user for `USER_TOKEN` and a super admin for `ADMIN_TOKEN`.
pub fn app_state(store: Arc<MemoryStore>, interpreter: ScriptedInterpreter) -> AppState {
    store.add_user(user_record("sub-user", Role::User));
    store.add_user(user_record("sub-admin", Role::SuperAdmin));

    let verifier = Arc::new(StaticVerifier::new(&[
        (USER_TOKEN, "sub-user"),
        (ADMIN_TOKEN, "sub-admin"),
        (FRESH_TOKEN, "sub-fresh"),
    ]));
    let deps = Dependencies {
        users: store.clone(),
        categories: store.clone(),
        expenses: store.clone(),
        messages: store.clone(),
        verifier: verifier.clone(),
        interpreter: Arc::new(interpreter),
    };
    let options = ChatOptions {
        history_limit: 50,
        interpretation_timeout: Duration::from_secs(2),
        auth_timeout: Duration::from_secs(2),
    };

    let sessions = Arc::new(SessionRegistry::new());
    let channels = spawn_services(&deps, sessions.clone(), &options);

    AppState {
        channels,
        authenticator: Arc::new(Authenticator::new(verifier, store)),
        sessions,
        auth_timeout: options.auth_timeout,
        expose_stack: true,
    }
}
