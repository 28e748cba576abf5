use regex::bytes::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_ENDPOINT: &str = "https://ntfy.sh";
pub const DEFAULT_USER_AGENT: &str = "SMSSyncer/1.0";
pub const DEFAULT_OTP_PATTERN: &str = r"\b\d{4,8}\b";

const DEFAULT_IMPORTANT_SENDERS: &[&str] = &[
    "bank", "delivery", "uber", "lyft", "amazon", "paypal", "venmo", "zelle", "doctor", "urgent",
    "security", "alert", "hdfc", "icici", "sbi", "axis", "kotak", "swiggy", "zomato", "flipkart",
    "myntra", "ola",
];

const DEFAULT_IMPORTANT_KEYWORDS: &[&str] = &[
    "urgent",
    "important",
    "delivery",
    "otp",
    "code",
    "verification",
    "security",
    "alert",
    "confirm",
    "expires",
    "deadline",
    "delivered",
    "transaction",
    "payment",
    "credited",
    "debited",
    "balance",
    "debit",
    "credit",
    "login",
    "log on",
];

const DEFAULT_SPAM_KEYWORDS: &[&str] = &[
    "offer",
    "discount",
    "sale",
    "promo",
    "unsubscribe",
    "marketing",
    "advertisement",
    "free",
    "win",
    "prize",
    "cashback",
    "rewards",
    "lucky",
    "congratulations",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
    /// Overrides the detected device label in forwarded payloads
    #[serde(default)]
    pub device_label: Option<String>,
    /// Phone number to contact name
    #[serde(default)]
    pub contacts: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub endpoint: String,
    pub topic: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

/// Rule sets consulted by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub important_senders: Vec<String>,
    pub important_keywords: Vec<String>,
    pub spam_keywords: Vec<String>,
    pub otp_pattern: String,
    pub forward_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// JSON file the event log is persisted to; in-memory only when unset
    pub path: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            topic: None,
            password: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_seconds: 15,
        }
    }
}

impl Default for EventLogConfig {
    fn default() -> Self {
        EventLogConfig {
            path: Some("/var/lib/sms-relay/events.json".to_string()),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            important_senders: to_owned(DEFAULT_IMPORTANT_SENDERS),
            important_keywords: to_owned(DEFAULT_IMPORTANT_KEYWORDS),
            spam_keywords: to_owned(DEFAULT_SPAM_KEYWORDS),
            otp_pattern: DEFAULT_OTP_PATTERN.to_string(),
            forward_all: false,
        }
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Compile an OTP pattern with ASCII classes: `\d` is `[0-9]` and `\b` only
/// sees ASCII word characters. Matching runs over the UTF-8 bytes of the body.
pub fn compile_otp_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).unicode(false).build()
}

impl FilterConfig {
    /// Rejects an OTP pattern that does not compile.
    pub fn validate(&self) -> Result<(), regex::Error> {
        compile_otp_pattern(&self.otp_pattern).map(|_| ())
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.filters.validate().map_err(|e| {
            anyhow::anyhow!("invalid otp_pattern '{}': {e}", self.filters.otp_pattern)
        })?;
        url::Url::parse(&self.relay.endpoint)
            .map_err(|e| anyhow::anyhow!("invalid relay endpoint '{}': {e}", self.relay.endpoint))?;
        if self.relay.timeout_seconds == 0 {
            anyhow::bail!("relay timeout_seconds must be greater than zero");
        }
        Ok(())
    }
}
