use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

mod models;
mod repositories;
pub mod services;
pub mod settings;

use repositories::{
    categories::CategoryRepository, expenses::ExpenseRepository,
    identity::firebase::FirebaseVerifier, interpretation::gemini::GeminiApi,
    messages::MessageRepository, users::UserRepository,
};
use services::{auth::Authenticator, http::AppState, realtime::SessionRegistry};
use settings::RunMode;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(short, long, default_value = "0.0.0.0:8000")]
    listen: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let settings = settings::Settings::new(&args.config).context("Could not load config file.")?;

    init_logging(&args.log4rs)?;
    log::info!("Starting expense tracker.");

    let conn = PgPoolOptions::new()
        .max_connections(settings.postgres.max_connections)
        .connect(&settings.postgres.url)
        .await
        .context("Could not connect to database.")?;

    let verifier = Arc::new(FirebaseVerifier::new(
        settings.identity.api_key.clone(),
        settings.identity.url.clone(),
        Duration::from_secs(settings.identity.timeout_secs),
    )?);
    let interpreter = Arc::new(GeminiApi::new(
        settings.interpretation.api_key.clone(),
        settings.interpretation.url.clone(),
        settings.interpretation.model.clone(),
        Duration::from_secs(settings.interpretation.timeout_secs),
    )?);

    let deps = services::Dependencies {
        users: Arc::new(UserRepository::new(conn.clone())),
        categories: Arc::new(CategoryRepository::new(conn.clone())),
        expenses: Arc::new(ExpenseRepository::new(conn.clone())),
        messages: Arc::new(MessageRepository::new(conn)),
        verifier,
        interpreter,
    };
    let options = services::ChatOptions::from_settings(&settings);

    log::info!("Starting services.");
    let sessions = Arc::new(SessionRegistry::new());
    let channels = services::spawn_services(&deps, sessions.clone(), &options);

    let state = AppState {
        channels,
        authenticator: Arc::new(Authenticator::new(deps.verifier.clone(), deps.users.clone())),
        sessions,
        auth_timeout: options.auth_timeout,
        expose_stack: settings.server.environment != RunMode::Production,
    };

    services::http::start_http_server(&args.listen, state).await
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
