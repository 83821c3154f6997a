use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use cron::Schedule;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub environment: String,
    pub timezone: Tz,
    pub attendance_closer_cron: String,
    pub leave_closer_cron: String,
    pub overtime_closer_cron: String,
    pub config_next_day_cron: String,
    pub config_next_month_cron: String,
    pub leave_closer_window_days: i64,
    pub notifier_prune_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_env_only()
    }

    /// Load configuration from environment variables only (without loading .env files)
    /// This is useful for testing where you want to control the environment directly
    pub fn from_env_only() -> Result<Self> {
        let timezone_name = env::var("APP_TIMEZONE").unwrap_or_else(|_| "Asia/Jakarta".to_string());
        let timezone = timezone_name
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid APP_TIMEZONE {}: {}", timezone_name, e))?;

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://@localhost:5432/worktime".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            timezone,
            attendance_closer_cron: env::var("ATTENDANCE_CLOSER_CRON")
                .unwrap_or_else(|_| "0 0 21 * * *".to_string()),
            leave_closer_cron: env::var("LEAVE_CLOSER_CRON")
                .unwrap_or_else(|_| "0 0 0 * * *".to_string()),
            overtime_closer_cron: env::var("OVERTIME_CLOSER_CRON")
                .unwrap_or_else(|_| "0 0 0 24 * *".to_string()),
            config_next_day_cron: env::var("CONFIG_NEXT_DAY_CRON")
                .unwrap_or_else(|_| "0 0 0 * * *".to_string()),
            config_next_month_cron: env::var("CONFIG_NEXT_MONTH_CRON")
                .unwrap_or_else(|_| "0 0 0 1 * *".to_string()),
            leave_closer_window_days: env::var("LEAVE_CLOSER_WINDOW_DAYS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            notifier_prune_seconds: env::var("NOTIFIER_PRUNE_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
        };

        config.validate_schedules()?;

        Ok(config)
    }

    fn validate_schedules(&self) -> Result<()> {
        for (name, expression) in [
            ("ATTENDANCE_CLOSER_CRON", &self.attendance_closer_cron),
            ("LEAVE_CLOSER_CRON", &self.leave_closer_cron),
            ("OVERTIME_CLOSER_CRON", &self.overtime_closer_cron),
            ("CONFIG_NEXT_DAY_CRON", &self.config_next_day_cron),
            ("CONFIG_NEXT_MONTH_CRON", &self.config_next_month_cron),
        ] {
            Schedule::from_str(expression)
                .with_context(|| format!("Invalid {} expression: {}", name, expression))?;
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
