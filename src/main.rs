use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use rentledger::cli::{self, Cli, Commands, DbCommands, TxCommands};
use rentledger::config::Config;
use rentledger::db;
use rentledger::gateway::PaystackClient;
use rentledger::services::mailer::{self, HttpEmailSender, MailerHandle, RetryPolicy};
use rentledger::services::notifier::Notifier;
use rentledger::services::reconciler::{self, Reconciler};
use rentledger::{AppState, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Tx(TxCommands::Reconcile { reference })) => {
            let pool = db::create_pool(&config).await?;
            let reconciler = build_reconciler(&config, pool);
            cli::handle_tx_reconcile(&reconciler, &reference).await
        }
        Some(Commands::Tx(TxCommands::List { status, limit })) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_list(&pool, &status, limit).await
        }
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Config) => {
            cli::handle_config_validate(&config)?;
            let pool = db::create_pool(&config).await?;
            let report = rentledger::startup::validate_environment(&config, &pool).await?;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("startup validation failed");
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let gateway = PaystackClient::new(
        config.paystack_base_url.clone(),
        config.paystack_secret_key.clone(),
    );
    tracing::info!("Payment gateway client initialized for {}", config.paystack_base_url);

    let notifier = Notifier::new(config.redis_url.as_deref());
    let mailer = spawn_mailer_if_configured(&config);

    let reconciler = Reconciler::new(pool.clone(), gateway.clone(), notifier.clone(), mailer);

    // Fallback reconciliation for payments whose webhook never arrived.
    tokio::spawn(reconciler::run_sweeper(reconciler.clone()));

    let state = AppState {
        db: pool,
        config: config.clone(),
        gateway,
        notifier,
        reconciler,
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_mailer_if_configured(config: &Config) -> Option<MailerHandle> {
    match (&config.mail_api_url, &config.mail_api_key) {
        (Some(url), Some(key)) => {
            let sender = Arc::new(HttpEmailSender::new(
                url.clone(),
                key.clone(),
                config.mail_from.clone(),
            ));
            tracing::info!("Email worker enabled via {}", url);
            Some(mailer::spawn_mailer(sender, RetryPolicy::default()))
        }
        _ => {
            tracing::warn!("MAIL_API_URL/MAIL_API_KEY not set, confirmation emails disabled");
            None
        }
    }
}

fn build_reconciler(config: &Config, pool: sqlx::PgPool) -> Reconciler {
    let gateway = PaystackClient::new(
        config.paystack_base_url.clone(),
        config.paystack_secret_key.clone(),
    );
    let notifier = Notifier::new(config.redis_url.as_deref());
    let mailer = spawn_mailer_if_configured(config);

    Reconciler::new(pool, gateway, notifier, mailer)
}
