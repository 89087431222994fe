use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub frontend_url: String,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").ok(),
            paystack_secret_key: env::var("PAYSTACK_SECRET_KEY")?,
            paystack_base_url: env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            mail_api_url: env::var("MAIL_API_URL").ok(),
            mail_api_key: env::var("MAIL_API_KEY").ok(),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@rentledger.local".to_string()),
        })
    }
}
