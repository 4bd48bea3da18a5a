//! Layered settings: defaults, then `hotel-settle.toml`, then `HOTEL_*` env vars.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Rate;

pub const DEFAULT_CONFIG_FILE: &str = "hotel-settle.toml";
pub const ENV_PREFIX: &str = "HOTEL_";

#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(#[from] Box<figment::Error>);

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub booking: BookingSettings,
    #[serde(default)]
    pub payment: PaymentSettings,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BookingSettings {
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Rate,
    #[serde(default = "default_service_rate")]
    pub service_rate: Rate,
    #[serde(default = "default_max_stay_nights")]
    pub max_stay_nights: u32,
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,
    #[serde(default = "default_reference_attempts")]
    pub reference_attempts: u32,
    #[serde(default = "default_invoice_prefix")]
    pub invoice_prefix: String,
    #[serde(default = "default_hold_window", with = "humantime_serde")]
    pub hold_window: Duration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            service_rate: default_service_rate(),
            max_stay_nights: default_max_stay_nights(),
            reference_prefix: default_reference_prefix(),
            reference_attempts: default_reference_attempts(),
            invoice_prefix: default_invoice_prefix(),
            hold_window: default_hold_window(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PaymentSettings {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Retried once when the gateway rejects `currency`.
    #[serde(default = "default_fallback_currency")]
    pub fallback_currency: Option<String>,
    /// Empty means webhook intake is not configured.
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_webhook_tolerance_seconds")]
    pub webhook_tolerance_seconds: i64,
    #[serde(default = "default_success_url")]
    pub success_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            fallback_currency: default_fallback_currency(),
            webhook_secret: String::new(),
            webhook_tolerance_seconds: default_webhook_tolerance_seconds(),
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
        }
    }
}

impl PaymentSettings {
    pub fn webhook_configured(&self) -> bool {
        !self.webhook_secret.is_empty()
    }
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_FILE`] (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Environment variables override file values; nested keys are split on
    /// `__`, e.g. `HOTEL_PAYMENT__WEBHOOK_SECRET`.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut fig = Figment::from(Serialized::defaults(Settings::default()));
        if path.as_ref().exists() {
            fig = fig.merge(Toml::file(path.as_ref()));
        }
        fig.merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError(Box::new(e)))
    }
}

fn default_tax_rate() -> Rate {
    Rate::from_scaled(1_600)
}

fn default_service_rate() -> Rate {
    Rate::from_scaled(500)
}

fn default_max_stay_nights() -> u32 {
    30
}

fn default_reference_prefix() -> String {
    "BK".to_string()
}

fn default_reference_attempts() -> u32 {
    8
}

fn default_invoice_prefix() -> String {
    "INV".to_string()
}

fn default_hold_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_fallback_currency() -> Option<String> {
    Some("usd".to_string())
}

fn default_webhook_tolerance_seconds() -> i64 {
    300
}

fn default_success_url() -> String {
    "http://localhost:8000/payments/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:8000/payments/cancel".to_string()
}
