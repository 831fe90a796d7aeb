use std::env;

/// Runtime configuration, read from the environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Base URL of this API, used in verification links.
    pub api_base_url: String,
    /// Base URL of the web front-end, used in password reset links.
    pub webpage_base_url: String,
    pub postmark_api_key: Option<String>,
    pub email_sender: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub session_ttl_hours: i64,
    pub reset_token_ttl_minutes: i64,
    pub bcrypt_cost: u32,
    pub bot_api_key: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            database_url: "mongodb://localhost:27017/course_registration".to_string(),
            api_base_url: "http://127.0.0.1:5000".to_string(),
            webpage_base_url: "http://127.0.0.1:3000".to_string(),
            postmark_api_key: None,
            email_sender: "notifier@gtregistration.com".to_string(),
            jwt_secret: "default-secret-change-me".to_string(),
            jwt_issuer: "course-notifier".to_string(),
            session_ttl_hours: 24,
            reset_token_ttl_minutes: 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            bot_api_key: None,
            cors_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match get("PORT").map(|p| p.parse::<u16>()) {
            Some(Ok(port)) => port,
            Some(Err(e)) => {
                log::warn!("⚠️  Invalid PORT ({}), using {}", e, defaults.port);
                defaults.port
            }
            None => defaults.port,
        };

        let bcrypt_cost = get("BCRYPT_COST")
            .and_then(|c| c.parse::<u32>().ok())
            .map(|c| c.clamp(4, 31))
            .unwrap_or(defaults.bcrypt_cost);

        let cors_origins = get("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            api_base_url: get("API_BASE_URL").unwrap_or(defaults.api_base_url),
            webpage_base_url: get("WEBPAGE_BASE_URL").unwrap_or(defaults.webpage_base_url),
            postmark_api_key: get("POSTMARK_API_KEY"),
            email_sender: get("EMAIL_SENDER").unwrap_or(defaults.email_sender),
            jwt_secret: get("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_issuer: get("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            session_ttl_hours: get("SESSION_TTL_HOURS")
                .and_then(|h| h.parse().ok())
                .unwrap_or(defaults.session_ttl_hours),
            reset_token_ttl_minutes: get("RESET_TOKEN_TTL_MINUTES")
                .and_then(|m| m.parse().ok())
                .unwrap_or(defaults.reset_token_ttl_minutes),
            bcrypt_cost,
            bot_api_key: get("BOT_API_KEY"),
            cors_origins,
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.reset_token_ttl_minutes, 60);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(config.postmark_api_key.is_none());
        assert!(config.bot_api_key.is_none());
        assert!(config.cors_origins.is_empty());
        assert!(!config.uses_memory_store());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "memory://"),
            ("BOT_API_KEY", "  bot-key "),
            ("CORS_ORIGINS", "http://localhost:3000, https://gtregistration.com,"),
            ("BCRYPT_COST", "6"),
        ]);
        assert_eq!(config.port, 8080);
        assert!(config.uses_memory_store());
        assert_eq!(config.bot_api_key.as_deref(), Some("bot-key"));
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "https://gtregistration.com"]
        );
        assert_eq!(config.bcrypt_cost, 6);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[("PORT", "not-a-port"), ("BCRYPT_COST", "1"), ("POSTMARK_API_KEY", "   ")]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.bcrypt_cost, 4);
        assert!(config.postmark_api_key.is_none());
    }
}
