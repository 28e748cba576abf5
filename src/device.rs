//! Best-effort label for the device doing the forwarding.

use std::path::PathBuf;

pub const UNKNOWN_DEVICE: &str = "Unknown Device";
pub const DEVICE_NAME_ENV: &str = "SMS_RELAY_DEVICE_NAME";

const HARDWARE_MODEL_PATH: &str = "/sys/devices/virtual/dmi/id/product_name";

/// One place a device label may come from.
#[derive(Debug, Clone)]
pub enum LabelSource {
    Fixed(String),
    Env(String),
    File(PathBuf),
}

impl LabelSource {
    fn read(&self) -> Option<String> {
        let value = match self {
            LabelSource::Fixed(label) => Some(label.clone()),
            LabelSource::Env(var) => std::env::var(var).ok(),
            LabelSource::File(path) => match std::fs::read_to_string(path) {
                Ok(content) => Some(content),
                Err(e) => {
                    log::debug!("Device label source {} unavailable: {e}", path.display());
                    None
                }
            },
        }?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// Walks the sources in order and returns the first usable label.
#[derive(Debug, Clone)]
pub struct DeviceLabelResolver {
    sources: Vec<LabelSource>,
}

impl DeviceLabelResolver {
    pub fn new(sources: Vec<LabelSource>) -> Self {
        Self { sources }
    }

    /// Configured label, env override, hostname, then hardware model.
    pub fn system(configured: Option<&str>) -> Self {
        let mut sources = Vec::new();
        if let Some(label) = configured {
            sources.push(LabelSource::Fixed(label.to_string()));
        }
        sources.push(LabelSource::Env(DEVICE_NAME_ENV.to_string()));
        sources.push(LabelSource::File(PathBuf::from("/etc/hostname")));
        sources.push(LabelSource::Env("HOSTNAME".to_string()));
        sources.push(LabelSource::File(PathBuf::from(HARDWARE_MODEL_PATH)));
        Self { sources }
    }

    pub fn resolve(&self) -> String {
        self.sources
            .iter()
            .find_map(LabelSource::read)
            .unwrap_or_else(|| UNKNOWN_DEVICE.to_string())
    }
}
