use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub elevated: ElevatedConfig,
    pub session: SessionConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Postgres role assumed for normal-privilege access so row-level policies apply
    pub row_level_role: String,
    /// Apply `migrations/` at startup
    pub run_migrations: bool,
}

/// Server-held credential for the privileged (row-level bypassing) handle.
/// Skipped on serialization so it never leaks into diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElevatedConfig {
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
    pub max_request_size_bytes: usize,
    pub json_logs: bool,
    pub default_list_limit: i64,
    pub max_list_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
    pub enable_audit_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Abort timeout applied to list loads
    pub list_timeout_secs: u64,
    /// UI-level fallback after which a pending list load is reported as failed
    pub list_fallback_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ROW_LEVEL_ROLE") {
            self.database.row_level_role = v;
        }
        if let Ok(v) = env::var("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // Elevated credential
        if let Ok(v) = env::var("ELEVATED_DATABASE_URL") {
            if !v.trim().is_empty() {
                self.elevated.database_url = Some(v);
            }
        }

        // Session overrides
        if let Ok(v) = env::var("SESSION_COOKIE_NAME") {
            self.session.cookie_name = v;
        }
        if let Ok(v) = env::var("SESSION_JWT_SECRET") {
            self.session.jwt_secret = v;
        }
        if let Ok(v) = env::var("SESSION_LEEWAY_SECS") {
            self.session.leeway_secs = v.parse().unwrap_or(self.session.leeway_secs);
        }

        // API overrides
        if let Ok(v) = env::var("INAMI_API_PORT").or_else(|_| env::var("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_REQUEST_TIMEOUT_SECS") {
            self.api.request_timeout_secs = v.parse().unwrap_or(self.api.request_timeout_secs);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_JSON_LOGS") {
            self.api.json_logs = v.parse().unwrap_or(self.api.json_logs);
        }
        if let Ok(v) = env::var("API_MAX_LIST_LIMIT") {
            self.api.max_list_limit = v.parse().unwrap_or(self.api.max_list_limit);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_AUDIT_LOGGING") {
            self.security.enable_audit_logging = v.parse().unwrap_or(self.security.enable_audit_logging);
        }

        // Client overrides
        if let Ok(v) = env::var("INAMI_API_URL") {
            self.client.base_url = v;
        }
        if let Ok(v) = env::var("CLIENT_LIST_TIMEOUT_SECS") {
            self.client.list_timeout_secs = v.parse().unwrap_or(self.client.list_timeout_secs);
        }
        if let Ok(v) = env::var("CLIENT_LIST_FALLBACK_SECS") {
            self.client.list_fallback_secs = v.parse().unwrap_or(self.client.list_fallback_secs);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                row_level_role: "authenticated".to_string(),
                run_migrations: true,
            },
            elevated: ElevatedConfig::default(),
            session: SessionConfig {
                cookie_name: "inami-session".to_string(),
                jwt_secret: String::new(),
                leeway_secs: 60,
            },
            api: ApiConfig {
                port: 3000,
                request_timeout_secs: 30,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                json_logs: false,
                default_list_limit: 100,
                max_list_limit: 1000,
            },
            security: SecurityConfig {
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
                enable_audit_logging: true,
            },
            client: ClientConfig {
                base_url: "http://localhost:3000".to_string(),
                list_timeout_secs: 10,
                list_fallback_secs: 15,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                row_level_role: "authenticated".to_string(),
                run_migrations: false,
            },
            elevated: ElevatedConfig::default(),
            session: SessionConfig {
                cookie_name: "inami-session".to_string(),
                jwt_secret: String::new(),
                leeway_secs: 30,
            },
            api: ApiConfig {
                port: 3000,
                request_timeout_secs: 20,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
                json_logs: true,
                default_list_limit: 100,
                max_list_limit: 500,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://staging.inami.example".to_string()],
                enable_audit_logging: true,
            },
            client: ClientConfig {
                base_url: "https://staging.inami.example".to_string(),
                list_timeout_secs: 10,
                list_fallback_secs: 15,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                row_level_role: "authenticated".to_string(),
                run_migrations: false,
            },
            elevated: ElevatedConfig::default(),
            session: SessionConfig {
                cookie_name: "inami-session".to_string(),
                jwt_secret: String::new(),
                leeway_secs: 0,
            },
            api: ApiConfig {
                port: 3000,
                request_timeout_secs: 15,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
                json_logs: true,
                default_list_limit: 50,
                max_list_limit: 200,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://inami.example".to_string()],
                enable_audit_logging: true,
            },
            client: ClientConfig {
                base_url: "https://inami.example".to_string(),
                list_timeout_secs: 10,
                list_fallback_secs: 15,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.session.cookie_name, "inami-session");
        assert_eq!(config.client.list_timeout_secs, 10);
        assert_eq!(config.client.list_fallback_secs, 15);
        assert!(config.elevated.database_url.is_none());
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.api.json_logs);
        assert_eq!(config.api.max_list_limit, 200);
        assert!(config.security.enable_audit_logging);
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = AppConfig::development();
        config.session.jwt_secret = "super-secret".into();
        config.elevated.database_url = Some("postgres://service:pw@db/inami".into());
        let rendered = serde_json::to_string(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("service:pw"));
    }
}
