use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codex_auth::{
    oauth::run_session_sweeper,
    probe::run_task_sweeper,
    server::{self, AppState},
    AccountStore, AccountTester, BatchCoordinator, CodexOAuthService, Configuration,
    InMemoryAccountStore, OAuthClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .init();

    // Load configuration
    let configuration = Configuration::new()?;
    tracing::info!("Configuration loaded successfully");

    let accounts: Arc<dyn AccountStore> = match &configuration.server.accounts_file {
        Some(path) => Arc::new(InMemoryAccountStore::from_file(path)?),
        None => {
            tracing::warn!("No accounts file configured, starting with an empty account store");
            Arc::new(InMemoryAccountStore::new())
        }
    };

    // Initialize services
    let oauth_client = Arc::new(OAuthClient::new(&configuration.oauth)?);
    let oauth = Arc::new(CodexOAuthService::new(
        &configuration,
        Arc::clone(&oauth_client),
        Arc::clone(&accounts),
    ));
    let tester = Arc::new(AccountTester::new(
        &configuration.probe,
        oauth_client,
        accounts,
    )?);
    let batches = Arc::new(BatchCoordinator::new(&configuration.probe, Arc::clone(&tester)));

    // The operator API stays up even if the redirect port is taken
    if let Err(e) = oauth.ensure_callback_server().await {
        tracing::error!("{}", e);
    }

    let interval = configuration.probe.cleanup_interval();
    tokio::spawn(run_session_sweeper(Arc::clone(oauth.sessions()), interval));
    tokio::spawn(run_task_sweeper(Arc::clone(&batches), interval));

    let app = server::router(AppState {
        oauth,
        tester,
        batches,
    });

    // Start server
    let addr = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
