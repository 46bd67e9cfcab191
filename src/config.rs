//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
    pub reconciliation: ReconciliationConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Which gateway deployment the credentials belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEnvironment {
    Sandbox,
    Production,
}

impl GatewayEnvironment {
    /// Lenient parse: the common spellings of a test deployment select the sandbox,
    /// everything else is production.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "sandbox" | "dev" | "development" | "test" | "testing" => Self::Sandbox,
            _ => Self::Production,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://dev.toyyibpay.com",
            Self::Production => "https://toyyibpay.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

/// Payment gateway credentials and bill defaults
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: GatewayEnvironment,
    pub user_secret_key: String,
    pub category_code: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub default_return_url: Option<String>,
    pub default_callback_url: Option<String>,
    pub bill_defaults: BillDefaults,
}

/// Values used when the mobile client leaves optional bill fields empty
#[derive(Debug, Clone)]
pub struct BillDefaults {
    pub email_domain: String,
    pub bill_name: String,
    pub bill_description: String,
    pub phone: String,
}

impl Default for BillDefaults {
    fn default() -> Self {
        Self {
            email_domain: "urbandrive.com".to_string(),
            bill_name: "Pay Commission".to_string(),
            bill_description: "Pay commission to company UrbanDriveSdnBhd".to_string(),
            phone: "0123456789".to_string(),
        }
    }
}

/// Remote document store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub database_secret: Option<String>,
    pub timeout_secs: u64,
}

/// Callback reconciliation tuning
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub mapping_max_attempts: u32,
    pub mapping_backoff: Duration,
    pub dedup_enabled: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            mapping_max_attempts: 3,
            mapping_backoff: Duration::from_millis(1000),
            dedup_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            store: StoreConfig::from_env()?,
            reconciliation: ReconciliationConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logging.validate()?;
        self.gateway.validate()?;
        self.store.validate()?;
        self.reconciliation.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = GatewayEnvironment::parse(
            &env::var("TOYYIBPAY_ENV").unwrap_or_else(|_| "production".to_string()),
        );
        let defaults = BillDefaults::default();

        Ok(GatewayConfig {
            environment,
            user_secret_key: env::var("TOYYIBPAY_USER_SECRET_KEY")
                .map_err(|_| ConfigError::MissingVariable("TOYYIBPAY_USER_SECRET_KEY".to_string()))?,
            category_code: env::var("TOYYIBPAY_CATEGORY_CODE")
                .map_err(|_| ConfigError::MissingVariable("TOYYIBPAY_CATEGORY_CODE".to_string()))?,
            base_url: env::var("TOYYIBPAY_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| environment.base_url().to_string()),
            timeout_secs: env::var("TOYYIBPAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TOYYIBPAY_TIMEOUT_SECS".to_string()))?,
            default_return_url: env::var("TOYYIBPAY_RETURN_URL").ok(),
            default_callback_url: env::var("TOYYIBPAY_CALLBACK_URL").ok(),
            bill_defaults: BillDefaults {
                email_domain: env::var("BILL_EMAIL_DOMAIN").unwrap_or(defaults.email_domain),
                bill_name: env::var("BILL_DEFAULT_NAME").unwrap_or(defaults.bill_name),
                bill_description: env::var("BILL_DEFAULT_DESCRIPTION")
                    .unwrap_or(defaults.bill_description),
                phone: env::var("BILL_DEFAULT_PHONE").unwrap_or(defaults.phone),
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "TOYYIBPAY_USER_SECRET_KEY".to_string(),
            ));
        }

        if self.category_code.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "TOYYIBPAY_CATEGORY_CODE".to_string(),
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "TOYYIBPAY_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "TOYYIBPAY_TIMEOUT_SECS".to_string(),
            ));
        }

        if !self.bill_defaults.phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::ValidationFailed(
                "BILL_DEFAULT_PHONE must contain digits only".to_string(),
            ));
        }

        Ok(())
    }

    /// Endpoint that creates bills
    pub fn create_bill_url(&self) -> String {
        format!("{}/index.php/api/createBill", self.base_url)
    }

    pub fn secret_key_preview(&self) -> String {
        secret_preview(&self.user_secret_key)
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(StoreConfig {
            // SKIP_EXTERNALS runs on the memory store; the URL is only logged
            database_url: env::var("FIREBASE_DATABASE_URL")
                .or_else(|_| {
                    if skip_externals() {
                        Ok("http://localhost:9000".to_string())
                    } else {
                        Err(ConfigError::MissingVariable(
                            "FIREBASE_DATABASE_URL".to_string(),
                        ))
                    }
                })?
                .trim_end_matches('/')
                .to_string(),
            database_secret: env::var("FIREBASE_DATABASE_SECRET")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            timeout_secs: env::var("FIREBASE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("FIREBASE_TIMEOUT_SECS".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::InvalidValue(
                "FIREBASE_DATABASE_URL".to_string(),
            ));
        }

        if !self.database_url.starts_with("http://") && !self.database_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue(
                "FIREBASE_DATABASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "FIREBASE_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ReconciliationConfig {
            mapping_max_attempts: env::var("MAPPING_LOOKUP_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            mapping_backoff: Duration::from_millis(
                env::var("MAPPING_LOOKUP_BACKOFF_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?,
            ),
            dedup_enabled: env::var("CALLBACK_DEDUP_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CALLBACK_DEDUP_ENABLED".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mapping_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "MAPPING_LOOKUP_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// First eight characters of a secret, for logs and diagnostics
pub fn secret_preview(secret: &str) -> String {
    if secret.is_empty() {
        return "MISSING".to_string();
    }
    format!("{}...", secret.chars().take(8).collect::<String>())
}

/// Whether the process should run against in-memory collaborators
pub fn skip_externals() -> bool {
    env::var("SKIP_EXTERNALS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true"
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<std::num::ParseIntError> for ConfigError {
    fn from(_: std::num::ParseIntError) -> Self {
        ConfigError::InvalidValue("Failed to parse integer value".to_string())
    }
}
