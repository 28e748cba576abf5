//! Collaborator stores: filter rules and relay credentials.

use crate::config::{compile_otp_pattern, Config, FilterConfig};
use crate::filter::FilterError;

use std::path::PathBuf;
use std::sync::RwLock;

/// Source of the current rule sets. Read on every classification.
pub trait FilterConfigStore: Send + Sync {
    fn get(&self) -> FilterConfig;
}

/// Lookup for a single secret value (topic or password).
pub trait SecretStore: Send + Sync {
    fn get(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticSecret(Option<String>);

impl StaticSecret {
    pub fn new(value: Option<String>) -> Self {
        Self(value)
    }
}

impl SecretStore for StaticSecret {
    fn get(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Environment variable, falling back to a configured value.
#[derive(Debug, Clone)]
pub struct EnvSecret {
    var: String,
    fallback: Option<String>,
}

impl EnvSecret {
    pub fn new(var: &str, fallback: Option<String>) -> Self {
        Self {
            var: var.to_string(),
            fallback,
        }
    }
}

impl SecretStore for EnvSecret {
    fn get(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.fallback.clone())
    }
}

/// Mask a topic for display, keeping the first and last two characters.
pub fn mask_topic(topic: &str) -> String {
    let chars: Vec<char> = topic.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 4))
}

/// In-process filter rules with validated writes.
#[derive(Debug, Default)]
pub struct MemoryFilterStore {
    config: RwLock<FilterConfig>,
}

impl MemoryFilterStore {
    pub fn new(config: FilterConfig) -> Result<Self, FilterError> {
        validate(&config)?;
        Ok(Self {
            config: RwLock::new(config),
        })
    }

    pub fn replace(&self, config: FilterConfig) -> Result<(), FilterError> {
        validate(&config)?;
        *self.write() = config;
        Ok(())
    }

    pub fn set_important_senders(&self, senders: Vec<String>) {
        self.write().important_senders = senders;
    }

    pub fn set_important_keywords(&self, keywords: Vec<String>) {
        self.write().important_keywords = keywords;
    }

    pub fn set_spam_keywords(&self, keywords: Vec<String>) {
        self.write().spam_keywords = keywords;
    }

    pub fn set_forward_all(&self, forward_all: bool) {
        self.write().forward_all = forward_all;
    }

    /// Store a new OTP pattern. Patterns that fail to compile are rejected and
    /// the previous pattern is kept.
    pub fn set_otp_pattern(&self, pattern: &str) -> Result<(), FilterError> {
        compile_otp_pattern(pattern).map_err(|source| FilterError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.write().otp_pattern = pattern.to_string();
        Ok(())
    }

    pub fn reset_to_defaults(&self) {
        *self.write() = FilterConfig::default();
    }

    pub fn is_customized(&self) -> bool {
        self.get() != FilterConfig::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, FilterConfig> {
        match self.config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl FilterConfigStore for MemoryFilterStore {
    fn get(&self) -> FilterConfig {
        match self.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn validate(config: &FilterConfig) -> Result<(), FilterError> {
    config
        .validate()
        .map_err(|source| FilterError::InvalidPattern {
            pattern: config.otp_pattern.clone(),
            source,
        })
}

/// Re-reads the `filters` section of the YAML config on every call so edits
/// take effect on the next message.
///
/// A file that cannot be read, parsed or validated is ignored with a warning
/// and the last good rules are returned instead.
#[derive(Debug)]
pub struct FileFilterStore {
    path: PathBuf,
    last_good: RwLock<FilterConfig>,
}

impl FileFilterStore {
    pub fn new<P: Into<PathBuf>>(path: P, initial: FilterConfig) -> Self {
        Self {
            path: path.into(),
            last_good: RwLock::new(initial),
        }
    }

    fn load(&self) -> anyhow::Result<FilterConfig> {
        let content = std::fs::read_to_string(&self.path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.filters.validate()?;
        Ok(config.filters)
    }
}

impl FilterConfigStore for FileFilterStore {
    fn get(&self) -> FilterConfig {
        match self.load() {
            Ok(filters) => {
                if let Ok(mut last_good) = self.last_good.write() {
                    *last_good = filters.clone();
                }
                filters
            }
            Err(e) => {
                log::warn!(
                    "Using last good filter rules, could not read {}: {e}",
                    self.path.display()
                );
                match self.last_good.read() {
                    Ok(config) => config.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                }
            }
        }
    }
}
