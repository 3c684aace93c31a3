use anyhow::Result;

/// Application configuration loaded from environment variables.
/// Secrets and env-specific values only; scoring defaults live in code
/// as an explicit `ScoringConfig` value.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,

    // Outbound email (webhook-style transactional mail API)
    pub mailer_webhook_url: Option<String>,
    pub mailer_from: Option<String>,

    // Feature flag for both scheduled procedures
    pub recommendations_enabled: bool,

    // Fixed offset the two cadences are pinned to (hours east of UTC)
    pub schedule_utc_offset_hours: i32,

    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")?,
            mailer_webhook_url: std::env::var("MAILER_WEBHOOK_URL").ok(),
            mailer_from: std::env::var("MAILER_FROM").ok(),
            recommendations_enabled: std::env::var("RECOMMENDATIONS_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            schedule_utc_offset_hours: std::env::var("SCHEDULE_UTC_OFFSET_HOURS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  MAILER_WEBHOOK_URL: {}", preview_opt(&self.mailer_webhook_url));
        tracing::info!("  RECOMMENDATIONS_ENABLED: {}", self.recommendations_enabled);
        tracing::info!("  SCHEDULE_UTC_OFFSET_HOURS: {}", self.schedule_utc_offset_hours);
    }
}
