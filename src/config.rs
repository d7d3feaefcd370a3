use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Applied to calls that don't set their own timeout. `None` waits forever.
    #[serde(default, with = "option_duration_ms")]
    pub default_timeout: Option<Duration>,

    /// Mini Apps version reported by the host, e.g. "7.2".
    #[serde(default)]
    pub host_version: Option<String>,

    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            host_version: None,
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl BridgeConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_host_version<S: Into<String>>(mut self, version: S) -> Self {
        self.host_version = Some(version.into());
        self
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.outbound_buffer == 0 {
            return Err(BridgeError::Config(
                "outbound_buffer must be greater than zero".to_string(),
            ));
        }
        if matches!(self.default_timeout, Some(d) if d.is_zero()) {
            return Err(BridgeError::Config(
                "default_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> BridgeResult<T> {
    let file = File::open(path)
        .map_err(|e| BridgeError::Config(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| BridgeError::Config(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> BridgeResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| BridgeError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_outbound_buffer() -> usize {
    256
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
