use super::Config;
use super::types::default_base_dir;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let base = default_base_dir();
        Self::load_or_init_at(&base)
    }

    /// Load `config.toml` from `base`, writing defaults when it does not exist yet.
    pub fn load_or_init_at(base: &Path) -> Result<Self> {
        let config_path = base.join("config.toml");

        if !base.exists() {
            fs::create_dir_all(base).context("Failed to create .benjamin directory")?;
        }

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.resolve_state_dir(base);
        config.apply_env_overrides();
        config.validate()?;
        fs::create_dir_all(&config.state_dir).context("Failed to create state directory")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::test_env::{ENV_LOCK, EnvVarGuard};
    use tempfile::TempDir;

    #[test]
    fn first_load_writes_default_file() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _g = EnvVarGuard::unset("BENJAMIN_STATE_DIR");
        let tmp = TempDir::new().unwrap();

        let config = Config::load_or_init_at(tmp.path()).unwrap();
        assert!(tmp.path().join("config.toml").exists());
        assert_eq!(config.state_dir, tmp.path().join("state"));
        assert!(config.state_dir.is_dir());
    }

    #[test]
    fn reload_preserves_saved_values() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _g = EnvVarGuard::unset("BENJAMIN_BREAKER_FAILURE_THRESHOLD");
        let tmp = TempDir::new().unwrap();

        let mut config = Config::load_or_init_at(tmp.path()).unwrap();
        config.breakers.failure_threshold = 7;
        config.save().unwrap();

        let reloaded = Config::load_or_init_at(tmp.path()).unwrap();
        assert_eq!(reloaded.breakers.failure_threshold, 7);
    }

    #[test]
    fn invalid_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[breakers\n").unwrap();
        let err = Config::load_or_init_at(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
