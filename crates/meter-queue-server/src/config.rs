use meter_queue_engine::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    /// Default log filter, used when `RUST_LOG` is not set
    pub log_level: String,
    /// Envelope source; stdin when unset
    pub input: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            engine: EngineConfig::default(),
            log_level: "info".to_string(),
            input: None,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level must not be empty".to_string()));
        }
        self.engine.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_nested_engine_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            concat!(
                "log_level: debug\n",
                "input: /var/spool/meter/envelopes.jsonl\n",
                "engine:\n",
                "  executor:\n",
                "    priority_boost_threshold_secs: 5\n",
            )
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.input,
            Some(PathBuf::from("/var/spool/meter/envelopes.jsonl"))
        );
        assert_eq!(config.engine.executor.priority_boost_threshold_secs, 5);
        assert_eq!(config.engine.executor.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_engine_section() {
        let mut config = ServerConfig::default();
        config.engine.queues.normal_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "engine: [not, a, mapping").unwrap();
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(ConfigError::Yaml(_))
        ));
    }
}
