use crate::error::ConfigError;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Process settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set to a Postgres instance"))?;

        let max_connections = match lookup("TRACKER_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidEnv {
                    name: "TRACKER_MAX_CONNECTIONS",
                    value: raw,
                })?,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}
