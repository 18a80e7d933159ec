use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Public URL of the storefront (payment return redirects)
    pub frontend_url: String,

    /// Public URL of this API (webhook notify URLs)
    pub backend_url: String,

    /// Currency code passed to the payment gateway
    #[serde(default = "default_currency")]
    pub currency: String,

    // ========== Payment gateway (Cashfree-compatible) ==========
    /// Payment gateway API base URL
    #[serde(default = "default_payment_api_base")]
    pub payment_api_base: String,

    /// Payment gateway client id
    pub payment_client_id: String,

    /// Payment gateway client secret
    pub payment_client_secret: String,

    /// Shared secret for verifying payment webhook signatures.
    /// When set, webhooks with a missing or wrong signature are rejected.
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: u64,

    // ========== Shipping gateway (Shiprocket-compatible) ==========
    /// Shipping gateway API base URL
    #[serde(default = "default_shipping_api_base")]
    pub shipping_api_base: String,

    /// Shipping gateway login email
    #[serde(default)]
    pub shipping_email: Option<String>,

    /// Shipping gateway login password
    #[serde(default)]
    pub shipping_password: Option<String>,

    /// Registered pickup location name
    #[serde(default = "default_pickup_location")]
    pub shipping_pickup_location: String,

    /// Pickup location pincode (serviceability checks)
    #[serde(default)]
    pub shipping_pickup_pincode: Option<String>,

    /// API key expected in the x-api-key header of shipment webhooks.
    /// When set, webhooks without it are rejected.
    #[serde(default)]
    pub shipment_webhook_api_key: Option<String>,

    // ========== Mail dispatch ==========
    /// URL of the external mail dispatch collaborator; unset disables mail
    #[serde(default)]
    pub mail_dispatch_url: Option<String>,

    /// Sender address passed to the mail collaborator
    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    // ========== Checkout policy ==========
    /// Subtotal above which shipping is free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: Decimal,

    /// Flat shipping fee below the free-shipping threshold
    #[serde(default = "default_flat_shipping_fee")]
    pub flat_shipping_fee: Decimal,

    /// GST-style flat tax rate applied to the subtotal
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub tax_rate: f64,

    /// Order total at or above which a reward coupon is issued
    #[serde(default = "default_reward_coupon_threshold")]
    pub reward_coupon_threshold: Decimal,

    /// Discount percentage on auto-issued reward coupons
    #[serde(default = "default_reward_coupon_percentage")]
    pub reward_coupon_percentage: u32,

    /// Reward coupon validity in days
    #[serde(default = "default_reward_coupon_validity_days")]
    pub reward_coupon_validity_days: i64,

    /// Maximum quantity per checkout line item
    #[serde(default = "default_max_line_quantity")]
    pub max_line_quantity: u32,

    /// Retention window for unconfirmed checkout sessions (seconds)
    #[serde(default = "default_checkout_session_ttl_secs")]
    pub checkout_session_ttl_secs: u64,

    /// Interval between expired-session sweeps (seconds)
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,

    /// Timeout on outbound collaborator calls (seconds)
    #[serde(default = "default_external_timeout_secs")]
    pub external_timeout_secs: u64,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// URL the gateway redirects the customer back to after payment
    pub fn payment_return_url(&self) -> String {
        format!(
            "{}/payment-success?order_id={{order_id}}",
            self.frontend_url.trim_end_matches('/')
        )
    }

    /// URL the gateway pushes payment webhooks to
    pub fn payment_notify_url(&self) -> String {
        format!(
            "{}/api/v1/payments/webhook",
            self.backend_url.trim_end_matches('/')
        )
    }

    pub fn external_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.external_timeout_secs)
    }

    pub fn checkout_session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.checkout_session_ttl_secs as i64)
    }

    fn validate_additional_constraints(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.is_production() && self.payment_webhook_secret.is_none() {
            let mut err = ValidationError::new("payment_webhook_secret_required");
            err.message = Some(
                "Production deployments must set APP__PAYMENT_WEBHOOK_SECRET so gateway webhooks can be authenticated".into(),
            );
            errors.add("payment_webhook_secret", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Logs warnings for optional integrations that are not configured.
    pub fn warn_on_missing_integrations(&self) {
        if self.shipping_email.is_none() || self.shipping_password.is_none() {
            warn!("Shipping gateway credentials not configured; shipment creation will fail until set");
        }
        if self.mail_dispatch_url.is_none() {
            warn!("Mail dispatch URL not configured; order confirmation mail is disabled");
        }
        if self.payment_webhook_secret.is_none() {
            warn!("Payment webhook secret not configured; webhook signatures will not be verified");
        }
        if self.shipment_webhook_api_key.is_none() {
            warn!("Shipment webhook API key not configured; shipment webhooks are unauthenticated");
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_payment_api_base() -> String {
    "https://sandbox.cashfree.com/pg".to_string()
}

fn default_shipping_api_base() -> String {
    "https://apiv2.shiprocket.in/v1/external".to_string()
}

fn default_pickup_location() -> String {
    "Primary".to_string()
}

fn default_mail_from() -> String {
    "orders@storefront.example".to_string()
}

fn default_webhook_tolerance_secs() -> u64 {
    300
}

fn default_free_shipping_threshold() -> Decimal {
    Decimal::from(5000)
}

fn default_flat_shipping_fee() -> Decimal {
    Decimal::from(99)
}

fn default_tax_rate() -> f64 {
    0.18 // flat GST rate
}

fn default_reward_coupon_threshold() -> Decimal {
    Decimal::from(20000)
}

fn default_reward_coupon_percentage() -> u32 {
    5
}

fn default_reward_coupon_validity_days() -> i64 {
    30
}

fn default_max_line_quantity() -> u32 {
    100
}

fn default_checkout_session_ttl_secs() -> u64 {
    3600
}

fn default_session_sweep_interval_secs() -> u64 {
    300
}

fn default_external_timeout_secs() -> u64 {
    30
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate < 0.0 || rate > 1.0 {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("frontend_url", "http://localhost:8080")?
        .set_default("backend_url", "http://localhost:8000")?
        .set_default("payment_client_id", "")?
        .set_default("payment_client_secret", "")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite://storefront.db?mode=memory".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            environment: "production".into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            frontend_url: "https://shop.example".into(),
            backend_url: "https://api.shop.example".into(),
            currency: default_currency(),
            payment_api_base: default_payment_api_base(),
            payment_client_id: "client".into(),
            payment_client_secret: "secret".into(),
            payment_webhook_secret: Some("whsec".into()),
            payment_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            shipping_api_base: default_shipping_api_base(),
            shipping_email: None,
            shipping_password: None,
            shipping_pickup_location: default_pickup_location(),
            shipping_pickup_pincode: None,
            shipment_webhook_api_key: None,
            mail_dispatch_url: None,
            mail_from: default_mail_from(),
            free_shipping_threshold: default_free_shipping_threshold(),
            flat_shipping_fee: default_flat_shipping_fee(),
            tax_rate: default_tax_rate(),
            reward_coupon_threshold: default_reward_coupon_threshold(),
            reward_coupon_percentage: default_reward_coupon_percentage(),
            reward_coupon_validity_days: default_reward_coupon_validity_days(),
            max_line_quantity: default_max_line_quantity(),
            checkout_session_ttl_secs: default_checkout_session_ttl_secs(),
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
            external_timeout_secs: default_external_timeout_secs(),
        }
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_allows_override_flag() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn production_requires_payment_webhook_secret() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example".into());
        cfg.payment_webhook_secret = None;
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.payment_webhook_secret = None;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn notify_and_return_urls_are_derived() {
        let cfg = base_config();
        assert_eq!(
            cfg.payment_notify_url(),
            "https://api.shop.example/api/v1/payments/webhook"
        );
        assert!(cfg.payment_return_url().starts_with("https://shop.example/payment-success"));
    }

    #[test]
    fn policy_defaults_match_pricing_rules() {
        let cfg = base_config();
        assert_eq!(cfg.free_shipping_threshold, dec!(5000));
        assert_eq!(cfg.flat_shipping_fee, dec!(99));
        assert_eq!(cfg.reward_coupon_threshold, dec!(20000));
        assert_eq!(cfg.tax_rate, 0.18);
    }

    #[test]
    fn test_config_is_valid_for_development() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate().is_ok());
    }
}
