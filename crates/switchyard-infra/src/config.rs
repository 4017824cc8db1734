//! Messaging configuration loader.
//!
//! Reads `switchyard.toml` from the configuration directory and deserializes
//! it into [`MessagingConfig`]. Falls back to defaults when the file is
//! missing or malformed.

use std::path::{Path, PathBuf};

use switchyard_types::config::MessagingConfig;

const CONFIG_FILE: &str = "switchyard.toml";

/// Resolve the configuration directory.
///
/// Priority:
/// 1. `SWITCHYARD_CONFIG_DIR` environment variable
/// 2. `~/.switchyard`
/// 3. `.switchyard` in the current directory
pub fn default_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SWITCHYARD_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".switchyard");
    }

    PathBuf::from(".switchyard")
}

/// Load messaging configuration from `{config_dir}/switchyard.toml`.
///
/// - If the file does not exist, returns [`MessagingConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
pub async fn load_messaging_config(config_dir: &Path) -> MessagingConfig {
    let config_path = config_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", config_path.display());
            return MessagingConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return MessagingConfig::default();
        }
    };

    match toml::from_str::<MessagingConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            MessagingConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_messaging_config(tmp.path()).await;
        assert_eq!(config, MessagingConfig::default());
    }

    #[tokio::test]
    async fn valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("switchyard.toml"),
            r#"
poll_interval_ms = 25
max_messages_per_poll = 4
dead_letter_channel = "failed"

[retry]
initial_delay_ms = 10
multiplier = 3
max_attempts = 2
"#,
        )
        .await
        .unwrap();

        let config = load_messaging_config(tmp.path()).await;
        assert_eq!(config.poll_interval_ms, 25);
        assert_eq!(config.max_messages_per_poll, 4);
        assert_eq!(config.dead_letter_channel.as_deref(), Some("failed"));
        let retry = config.retry.unwrap();
        assert_eq!(retry.multiplier, 3);
        assert_eq!(retry.max_attempts, Some(2));
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("switchyard.toml"), "poll_interval_ms = \"soon\"")
            .await
            .unwrap();

        let config = load_messaging_config(tmp.path()).await;
        assert_eq!(config, MessagingConfig::default());
    }

    #[tokio::test]
    async fn directory_in_place_of_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::create_dir(tmp.path().join("switchyard.toml")).await.unwrap();

        let config = load_messaging_config(tmp.path()).await;
        assert_eq!(config, MessagingConfig::default());
    }
}
