use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub razorpay: RazorpayConfig,
    pub billing: BillingConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub api_base_url: String,
}

/// Billing policy knobs. The late-fee daily rate is deliberately
/// configuration, not a hard-coded figure.
#[derive(Deserialize, Clone, Debug)]
pub struct BillingConfig {
    pub currency: String,
    pub late_fee_daily_rate: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("RENT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("RENT_SERVICE_PORT")
            .unwrap_or_else(|_| "3003".to_string())
            .parse()?;

        let db_url = env::var("RENT_DATABASE_URL").expect("RENT_DATABASE_URL must be set");
        let db_name = env::var("RENT_DATABASE_NAME").unwrap_or_else(|_| "rent_db".to_string());

        let key_id = env::var("RAZORPAY_KEY_ID").unwrap_or_default();
        let key_secret = env::var("RAZORPAY_KEY_SECRET").unwrap_or_default();
        let api_base_url = env::var("RAZORPAY_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string());

        let currency = env::var("RENT_CURRENCY").unwrap_or_else(|_| "INR".to_string());
        let late_fee_daily_rate = env::var("RENT_LATE_FEE_DAILY_RATE")
            .unwrap_or_else(|_| "50".to_string())
            .parse()?;

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            razorpay: RazorpayConfig {
                key_id,
                key_secret: Secret::new(key_secret),
                api_base_url,
            },
            billing: BillingConfig {
                currency,
                late_fee_daily_rate,
            },
            service_name: "payment-service".to_string(),
        })
    }
}
