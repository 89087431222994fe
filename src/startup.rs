use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub gateway: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis && self.gateway
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));
        println!("Gateway Connectivity:  {}", status(self.gateway));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        gateway: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    // Redis is optional; fan-out degrades to in-process broadcast without it.
    if let Some(redis_url) = &config.redis_url {
        if let Err(e) = validate_redis(redis_url).await {
            report.redis = false;
            report.errors.push(format!("Redis: {}", e));
        }
    }

    if let Err(e) = validate_gateway(&config.paystack_base_url).await {
        report.gateway = false;
        report.errors.push(format!("Gateway: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.paystack_secret_key.is_empty() {
        anyhow::bail!("PAYSTACK_SECRET_KEY is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }

    url::Url::parse(&config.paystack_base_url)
        .context("PAYSTACK_BASE_URL is not a valid URL")?;
    url::Url::parse(&config.frontend_url).context("FRONTEND_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_tokio_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}

async fn validate_gateway(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(base_url)
        .send()
        .await
        .context("Failed to connect to payment gateway")?;

    // Any HTTP response proves reachability; unauthenticated requests are
    // expected to be rejected.
    if response.status().is_server_error() {
        anyhow::bail!("Gateway returned status: {}", response.status());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/rentledger".to_string(),
            redis_url: Some("redis://localhost:6379".to_string()),
            paystack_secret_key: "sk_test_xyz".to_string(),
            paystack_base_url: "https://api.paystack.co".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "no-reply@rentledger.local".to_string(),
        }
    }

    #[test]
    fn test_validate_env_vars_ok() {
        assert!(validate_env_vars(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_env_vars_empty_database_url() {
        let mut config = base_config();
        config.database_url = String::new();

        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_empty_secret_key() {
        let mut config = base_config();
        config.paystack_secret_key = String::new();

        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_invalid_gateway_url() {
        let mut config = base_config();
        config.paystack_base_url = "not-a-url".to_string();

        assert!(validate_env_vars(&config).is_err());
    }
}
