//! # Listener Configuration
//!
//! Run-time toggles consulted by the fault listener and the buffered
//! tracking client. Values come from defaults, an optional configuration
//! file and `FAULT_REPORTING_*` environment variables, in that order of
//! precedence (later wins).

use serde::{Serialize, Deserialize};
use crate::types::{Error, Result};

/// Environment variable prefix for all settings
pub const ENV_PREFIX: &str = "FAULT_REPORTING";

/// Default headroom added to the memory limit after an out-of-memory fault (5 MiB)
pub const DEFAULT_MEMORY_LIMIT_INCREASE: u64 = 5 * 1024 * 1024;

/// Configuration for fault reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Whether reports are produced at all
    pub auto_notify: bool,
    /// Bytes added to the memory limit after an out-of-memory fault; `None` disables remediation
    pub memory_limit_increase: Option<u64>,
    /// Host framework name recorded in every report's severity reason
    pub framework: String,
    /// Classification applied to reports raised while serving a request
    pub fallback_classification: String,
    /// Request header and parameter names whose values are filtered from reports
    pub redacted_keys: Vec<String>,
    /// Reports buffered before the client flushes on its own
    pub batch_size: usize,
    /// Number of recent reports kept in memory for inspection
    pub recent_limit: usize,
    /// Most reports held back after failed deliveries; the oldest are dropped beyond it
    pub queue_limit: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            auto_notify: true,
            memory_limit_increase: Some(DEFAULT_MEMORY_LIMIT_INCREASE),
            framework: "Symfony".to_string(),
            fallback_classification: "HTTP".to_string(),
            redacted_keys: vec![
                "password".to_string(),
                "authorization".to_string(),
                "cookie".to_string(),
                "token".to_string(),
                "secret".to_string(),
            ],
            batch_size: 50,
            recent_limit: 100,
            queue_limit: 500,
        }
    }
}

/// Collects settings from an optional file and the environment.
///
/// A `.env` file in the working directory is read first if present. The
/// result feeds both [`Configuration`] and the `logging.*` settings.
pub fn load_sources(path: Option<&str>) -> Result<config::Config> {
    dotenv::dotenv().ok();

    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }
    let cfg = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("redacted_keys"),
        )
        .build()?;

    Ok(cfg)
}

impl Configuration {
    /// Loads configuration from an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::from_sources(load_sources(path)?)
    }

    /// Builds and validates configuration from collected settings
    pub fn from_sources(cfg: config::Config) -> Result<Self> {
        let configuration = Self::try_from(cfg)?;
        configuration.validate()?;

        tracing::debug!(
            auto_notify = configuration.auto_notify,
            memory_limit_increase = ?configuration.memory_limit_increase,
            framework = %configuration.framework,
            "Fault reporting configuration loaded"
        );

        Ok(configuration)
    }

    /// Disables report production
    pub fn without_notify(mut self) -> Self {
        self.auto_notify = false;
        self
    }

    /// Sets the memory limit increase used by out-of-memory remediation
    pub fn memory_limit_increase(mut self, increase: Option<u64>) -> Self {
        self.memory_limit_increase = increase;
        self
    }

    /// Sets the host framework name
    pub fn framework<S: Into<String>>(mut self, framework: S) -> Self {
        self.framework = framework.into();
        self
    }

    /// Checks internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.framework.trim().is_empty() {
            return Err(Error::configuration("framework name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(Error::configuration("batch_size must be at least 1"));
        }
        if self.queue_limit < self.batch_size {
            return Err(Error::configuration("queue_limit must not be below batch_size"));
        }
        Ok(())
    }
}

/// Parses a memory limit increase setting; `none`, `off` or an empty value disables it
fn parse_memory_limit_increase(raw: &str) -> std::result::Result<Option<u64>, config::ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    raw.parse::<u64>().map(Some).map_err(|_| {
        config::ConfigError::Message(format!(
            "memory_limit_increase must be a byte count or 'none', got '{}'",
            raw
        ))
    })
}

impl TryFrom<config::Config> for Configuration {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> std::result::Result<Self, Self::Error> {
        // Start with defaults and override from config where present.
        let mut base = Configuration::default();

        if let Ok(auto_notify) = cfg.get::<bool>("auto_notify") {
            base.auto_notify = auto_notify;
        }
        match cfg.get::<Option<String>>("memory_limit_increase") {
            Ok(Some(increase)) => base.memory_limit_increase = parse_memory_limit_increase(&increase)?,
            Ok(None) => base.memory_limit_increase = None,
            Err(config::ConfigError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        if let Ok(framework) = cfg.get::<String>("framework") {
            base.framework = framework;
        }
        if let Ok(classification) = cfg.get::<String>("fallback_classification") {
            base.fallback_classification = classification;
        }
        if let Ok(keys) = cfg.get::<Vec<String>>("redacted_keys") {
            base.redacted_keys = keys
                .into_iter()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect();
        }
        if let Ok(batch_size) = cfg.get::<usize>("batch_size") {
            base.batch_size = batch_size;
        }
        if let Ok(recent_limit) = cfg.get::<usize>("recent_limit") {
            base.recent_limit = recent_limit;
        }
        if let Ok(queue_limit) = cfg.get::<usize>("queue_limit") {
            base.queue_limit = queue_limit;
        }

        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LoggingConfig;
    use std::{env, fs};

    fn build(pairs: &[(&str, &str)]) -> config::Config {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = Configuration::default();
        assert!(cfg.auto_notify);
        assert_eq!(cfg.memory_limit_increase, Some(5_242_880));
        assert_eq!(cfg.fallback_classification, "HTTP");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_overrides_from_config() {
        let cfg = Configuration::try_from(build(&[
            ("auto_notify", "false"),
            ("memory_limit_increase", "67108864"),
            ("framework", "Laravel"),
        ]))
        .unwrap();

        assert!(!cfg.auto_notify);
        assert_eq!(cfg.memory_limit_increase, Some(67_108_864));
        assert_eq!(cfg.framework, "Laravel");
        assert_eq!(cfg.batch_size, Configuration::default().batch_size);
    }

    #[test]
    fn test_memory_limit_increase_can_be_disabled() {
        let cfg = Configuration::try_from(build(&[("memory_limit_increase", "none")])).unwrap();
        assert_eq!(cfg.memory_limit_increase, None);

        let err = Configuration::try_from(build(&[("memory_limit_increase", "lots")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_null_memory_limit_increase_disables_remediation() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "memory_limit_increase: ~\nframework: Laravel\n",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap();

        let configuration = Configuration::try_from(cfg).unwrap();
        assert_eq!(configuration.memory_limit_increase, None);
        assert_eq!(configuration.framework, "Laravel");
    }

    #[test]
    fn test_empty_redacted_keys_are_ignored() {
        let cfg = config::Config::builder()
            .set_override("redacted_keys", vec!["password", "", " "])
            .unwrap()
            .build()
            .unwrap();

        let configuration = Configuration::try_from(cfg).unwrap();
        assert_eq!(configuration.redacted_keys, vec!["password".to_string()]);
    }

    #[test]
    fn test_load_from_environment() {
        env::set_var("FAULT_REPORTING_AUTO_NOTIFY", "false");
        env::set_var("FAULT_REPORTING_MEMORY_LIMIT_INCREASE", "none");
        env::set_var("FAULT_REPORTING_REDACTED_KEYS", "password,api_key,");

        let loaded = Configuration::load(None);

        env::remove_var("FAULT_REPORTING_AUTO_NOTIFY");
        env::remove_var("FAULT_REPORTING_MEMORY_LIMIT_INCREASE");
        env::remove_var("FAULT_REPORTING_REDACTED_KEYS");

        let configuration = loaded.unwrap();
        assert!(!configuration.auto_notify);
        assert_eq!(configuration.memory_limit_increase, None);
        assert_eq!(configuration.redacted_keys, vec!["password".to_string(), "api_key".to_string()]);
    }

    #[test]
    fn test_file_sources_feed_logging_and_configuration() {
        let path = env::temp_dir().join(format!("fault-reporting-{}.yaml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            "framework: Laravel\nfallback_classification: Web\nlogging:\n  level: debug\n  service_name: shop\n",
        )
        .unwrap();

        let sources = load_sources(path.to_str());
        fs::remove_file(&path).unwrap();
        let sources = sources.unwrap();

        let logging = LoggingConfig::try_from(sources.clone()).unwrap();
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.service_name, "shop");

        let configuration = Configuration::from_sources(sources).unwrap();
        assert_eq!(configuration.framework, "Laravel");
        assert_eq!(configuration.fallback_classification, "Web");
    }

    #[test]
    fn test_validate_rejects_empty_framework() {
        let cfg = Configuration::default().framework("  ");
        assert!(matches!(cfg.validate(), Err(Error::Configuration(_))));

        let cfg = Configuration {
            batch_size: 10,
            queue_limit: 5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
