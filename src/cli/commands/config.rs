use anyhow::Result;
use std::path::PathBuf;

use crate::cli::commands::Command;
use crate::config::MigratorConfig;

pub struct ConfigCommand {
    config: MigratorConfig,
    write: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(config: MigratorConfig) -> Self {
        Self {
            config,
            write: None,
        }
    }

    pub fn with_write(mut self, path: Option<PathBuf>) -> Self {
        self.write = path;
        self
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        // Never echo the token
        let mut shown = self.config.clone();
        if shown.backend.token.is_some() {
            shown.backend.token = Some("********".to_string());
        }

        println!("⚙️  Effective configuration");
        println!("==========================");
        println!("{}", toml::to_string_pretty(&shown)?);

        if let Some(path) = &self.write {
            self.config.save_to_file(path)?;
            println!("💾 Written to {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_saves_effective_config() {
        let dir = std::env::temp_dir().join(format!("job-migrator-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("written.toml");

        let mut config = MigratorConfig::default();
        config.polling.interval_ms = 250;
        ConfigCommand::new(config)
            .with_write(Some(path.clone()))
            .execute()
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("interval_ms = 250"));
        assert!(written.contains("[backend.rate_limit]"));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
