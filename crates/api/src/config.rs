//! API server configuration, loaded from the environment once at startup.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    /// Where OAuth callbacks redirect users back to.
    pub app_base_url: String,
    pub todoist: Option<TodoistConfig>,
}

#[derive(Debug, Clone)]
pub struct TodoistConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let app_base_url = std::env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "https://pomodorotimer.vip".to_string());

        // Todoist is optional: without credentials the integration routes
        // report a precondition failure instead of refusing to boot.
        let todoist = match (
            std::env::var("TODOIST_CLIENT_ID"),
            std::env::var("TODOIST_CLIENT_SECRET"),
            std::env::var("TODOIST_REDIRECT_URI"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(redirect_uri)) => Some(TodoistConfig {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => None,
        };

        Ok(Config {
            database_url,
            bind_addr,
            jwt_secret,
            app_base_url,
            todoist,
        })
    }
}
