use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Lavalink
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,

    // Paths
    pub data_dir: PathBuf,

    // AutoVoice
    pub creation_cooldown_ms: u64,
    pub delete_grace_ms: u64,

    // Límites
    pub max_history_size: usize,
    pub max_queue_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Lavalink
            lavalink_host: std::env::var("LAVALINK_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            lavalink_port: std::env::var("LAVALINK_PORT")
                .unwrap_or_else(|_| "2333".to_string())
                .parse()?,
            lavalink_password: std::env::var("LAVALINK_PASSWORD")
                .unwrap_or_else(|_| "youshallnotpass".to_string()),

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "/app/data".to_string())
                .into(),

            // AutoVoice
            creation_cooldown_ms: std::env::var("CREATION_COOLDOWN_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,
            delete_grace_ms: std::env::var("DELETE_GRACE_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,

            // Límites
            max_history_size: std::env::var("MAX_HISTORY_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores de configuración antes de arrancar el bot.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.lavalink_host.trim().is_empty() {
            anyhow::bail!("LAVALINK_HOST no puede estar vacío");
        }

        if self.max_history_size == 0 {
            anyhow::bail!("MAX_HISTORY_SIZE debe ser mayor que cero");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("MAX_QUEUE_SIZE debe ser mayor que cero");
        }

        Ok(())
    }

    /// URL base del API REST de Lavalink.
    pub fn lavalink_rest_url(&self) -> String {
        format!("http://{}:{}", self.lavalink_host, self.lavalink_port)
    }

    /// URL del WebSocket de eventos de Lavalink.
    pub fn lavalink_ws_url(&self) -> String {
        format!("ws://{}:{}/v4/websocket", self.lavalink_host, self.lavalink_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base_config() -> Config {
        Config {
            discord_token: "token".to_string(),
            application_id: 1,
            guild_id: None,
            lavalink_host: "localhost".to_string(),
            lavalink_port: 2333,
            lavalink_password: "pass".to_string(),
            data_dir: PathBuf::from("/tmp"),
            creation_cooldown_ms: 5000,
            delete_grace_ms: 2000,
            max_history_size: 50,
            max_queue_size: 1000,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let mut config = base_config();
        config.discord_token = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_history() {
        let mut config = base_config();
        config.max_history_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lavalink_urls() {
        let config = base_config();
        assert_eq!(config.lavalink_rest_url(), "http://localhost:2333");
        assert_eq!(config.lavalink_ws_url(), "ws://localhost:2333/v4/websocket");
    }
}
