/// Configuration management for the user management service
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub bootstrap: BootstrapConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: DatabaseLocation,
    pub max_connections: u32,
}

/// Where the account database lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DatabaseLocation {
    File { path: PathBuf },
    Memory,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
}

/// Seed account created on first deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub admin_login: String,
    #[serde(skip_serializing)]
    pub admin_password: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub anonymous_rps: u32,
    pub authenticated_rps: u32,
    pub login_per_minute: u32,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
}

pub const DEFAULT_BOOTSTRAP_PASSWORD: &str = "Admin123";

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("UMA_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("UMA_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;
        let version = env!("CARGO_PKG_VERSION").to_string();

        let data_directory: PathBuf = env::var("UMA_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = match env::var("UMA_DATABASE_LOCATION") {
            Ok(location) if location == ":memory:" => DatabaseLocation::Memory,
            Ok(location) => DatabaseLocation::File {
                path: PathBuf::from(location),
            },
            Err(_) => DatabaseLocation::File {
                path: data_directory.join("users.sqlite"),
            },
        };
        let max_connections = parse_var("UMA_DATABASE_MAX_CONNECTIONS", 10)?;

        let jwt_secret = env::var("UMA_JWT_SECRET")
            .map_err(|_| ApiError::Validation("JWT secret required (UMA_JWT_SECRET)".to_string()))?;
        let jwt_issuer =
            env::var("UMA_JWT_ISSUER").unwrap_or_else(|_| "UserManagementApi".to_string());
        let jwt_audience =
            env::var("UMA_JWT_AUDIENCE").unwrap_or_else(|_| "UserManagementApiClient".to_string());

        let admin_login =
            env::var("UMA_BOOTSTRAP_ADMIN_LOGIN").unwrap_or_else(|_| "admin".to_string());
        let admin_password = env::var("UMA_BOOTSTRAP_ADMIN_PASSWORD")
            .unwrap_or_else(|_| DEFAULT_BOOTSTRAP_PASSWORD.to_string());

        let rate_limit = RateLimitConfig {
            enabled: parse_var("UMA_RATE_LIMITS_ENABLED", true)?,
            anonymous_rps: parse_var("UMA_RATE_LIMIT_ANONYMOUS_RPS", 10)?,
            authenticated_rps: parse_var("UMA_RATE_LIMIT_AUTHENTICATED_RPS", 100)?,
            login_per_minute: parse_var("UMA_RATE_LIMIT_LOGIN_PER_MINUTE", 30)?,
        };

        let filter = env::var("RUST_LOG")
            .unwrap_or_else(|_| "user_management_api=info,tower_http=info".to_string());
        let format = match env::var("UMA_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(ApiError::Validation(format!(
                    "Invalid UMA_LOG_FORMAT '{}', expected 'pretty' or 'json'",
                    other
                )))
            }
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                jwt_issuer,
                jwt_audience,
            },
            bootstrap: BootstrapConfig {
                admin_login,
                admin_password,
            },
            rate_limit,
            logging: LoggingConfig { filter, format },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ApiError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(ApiError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        crate::account::validate_login(&self.bootstrap.admin_login).map_err(|_| {
            ApiError::Validation(format!(
                "Bootstrap admin login '{}' is not a valid login",
                self.bootstrap.admin_login
            ))
        })?;

        if self.bootstrap.admin_password.is_empty() {
            return Err(ApiError::Validation(
                "Bootstrap admin password cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Address the HTTP listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.hostname, self.service.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> ApiResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ApiError::Validation(format!("Invalid value for {}: '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}
