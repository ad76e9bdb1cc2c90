use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use whirlpool_rebalancer::{
    api, init_db, Config, Gateway, HeliusFeeEstimator, HttpGateway, LogNotifier, Notifier,
    Rebalancer, Repository, TelegramNotifier,
};

/// `RUST_LOG` when set, otherwise the configured level.
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

async fn serve_status(port: u16, state: api::AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("Status server listening on {}", addr);
    axum::serve(listener, api::create_router(state))
        .await
        .context("Status server error")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.log_level))
        .init();

    // Database failure is the one startup error that stops the process.
    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("Failed to initialize database {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(config.gateway_url.clone()));

    let notifier: Arc<dyn Notifier> = match &config.telegram_bot_token {
        Some(token) => Arc::new(TelegramNotifier::new(
            token,
            config.telegram_chat_ids.clone(),
            repo.clone(),
        )),
        None => {
            tracing::warn!("TELEGRAM_BOT_TOKEN not set, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    let mut rebalancer = Rebalancer::new(gateway, repo.clone(), notifier, config.clone());
    if config.is_production {
        match &config.priority_fee_url {
            Some(url) => {
                rebalancer = rebalancer.with_fee_estimator(Arc::new(HeliusFeeEstimator::new(url)));
            }
            None => tracing::warn!("PRIORITY_FEE_URL not set, submitting without priority fees"),
        }
    }

    if let Some(port) = config.status_port {
        let state = api::AppState::new(repo.clone(), config.clone());
        tokio::spawn(async move {
            if let Err(e) = serve_status(port, state).await {
                tracing::error!(error = %e, "Status server stopped");
            }
        });
    }

    rebalancer.run_forever().await;
    Ok(())
}
