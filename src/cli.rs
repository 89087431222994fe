use clap::{Parser, Subcommand};
use sqlx::PgPool;

use crate::config::Config;
use crate::db::models::TransactionStatus;
use crate::db::queries;
use crate::services::reconciler::{ReconcileOutcome, Reconciler};

#[derive(Parser)]
#[command(name = "rentledger")]
#[command(about = "Rentledger - Rent Payment Processor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Reconcile a transaction against the gateway's verify endpoint
    Reconcile {
        /// Transaction reference
        #[arg(value_name = "REFERENCE")]
        reference: String,
    },

    /// List transactions by status
    List {
        /// Status to filter by (pending, successful, failed, abandoned)
        #[arg(short, long, default_value = "pending")]
        status: String,

        /// Maximum number of rows
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_reconcile(reconciler: &Reconciler, reference: &str) -> anyhow::Result<()> {
    match reconciler.reconcile_by_verify(reference).await? {
        ReconcileOutcome::Transitioned(status) => {
            tracing::info!("Transaction {} reconciled to {}", reference, status);
            println!("✓ Transaction {} reconciled to {}", reference, status);
            Ok(())
        }
        ReconcileOutcome::AlreadyResolved => {
            println!("Transaction {} already resolved, nothing to do", reference);
            Ok(())
        }
        ReconcileOutcome::UnknownReference => {
            anyhow::bail!("Transaction {} not found", reference)
        }
        ReconcileOutcome::Ignored => unreachable!("verify path has no event type"),
    }
}

pub async fn handle_tx_list(pool: &PgPool, status_str: &str, limit: i64) -> anyhow::Result<()> {
    let status = parse_status(status_str)?;
    let transactions = queries::list_by_status(pool, status, limit).await?;

    if transactions.is_empty() {
        println!("No {} transactions found", status);
        return Ok(());
    }

    println!(
        "{:<18} {:<12} {:<14} {:<5} {:<20}",
        "Reference", "Status", "Amount", "Cur", "Created"
    );
    println!("{}", "-".repeat(72));

    for tx in transactions {
        println!(
            "{:<18} {:<12} {:<14} {:<5} {:<20}",
            tx.reference,
            tx.status.to_string(),
            tx.amount.to_string(),
            tx.currency,
            tx.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    let counts = queries::status_counts(pool).await?;
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort();
    let summary: Vec<String> = counts
        .iter()
        .map(|(status, n)| format!("{} {}", n, status))
        .collect();
    println!("\nLedger totals: {}", summary.join(", "));

    Ok(())
}

fn parse_status(value: &str) -> anyhow::Result<TransactionStatus> {
    match value.to_lowercase().as_str() {
        "pending" => Ok(TransactionStatus::Pending),
        "successful" => Ok(TransactionStatus::Successful),
        "failed" => Ok(TransactionStatus::Failed),
        "abandoned" => Ok(TransactionStatus::Abandoned),
        _ => anyhow::bail!("Invalid status. Use: pending, successful, failed, or abandoned"),
    }
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    use sqlx::migrate::Migrator;
    use std::path::Path;

    let pool = crate::db::create_pool(config).await?;
    let migrator = Migrator::new(Path::new("./migrations")).await?;

    tracing::info!("Running database migrations...");
    migrator.run(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Gateway URL: {}", config.paystack_base_url);
    println!("  Frontend URL: {}", config.frontend_url);
    println!(
        "  Mail API: {}",
        if config.mail_api_url.is_some() { "configured" } else { "disabled" }
    );

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
