//! Configuration types for the network interface manager
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the generated resolver configuration
pub const DEFAULT_RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

/// Main NIM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NimConfig {
    /// Reachability probe configuration
    pub probe: ProbeConfig,

    /// Publisher configuration
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Where the resolver configuration is written
    #[serde(default = "default_resolv_conf_path")]
    pub resolv_conf_path: PathBuf,

    #[serde(default)]
    pub timers: TimerConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    /// Capacity of the outbound monitoring event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl NimConfig {
    /// Create a configuration with defaults for the given probe
    pub fn new(probe: ProbeConfig) -> Self {
        Self {
            probe,
            publisher: PublisherConfig::default(),
            resolv_conf_path: default_resolv_conf_path(),
            timers: TimerConfig::default(),
            verify: VerifyConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.probe.validate()?;
        self.publisher.validate()?;
        self.timers.validate()?;
        self.verify.validate()?;

        if self.resolv_conf_path.as_os_str().is_empty() {
            return Err(crate::Error::config("resolv.conf path cannot be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

/// Reachability probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// HTTP(S) request to the controller
    Http {
        /// URL to request (e.g. "https://controller.example.com/api/v1/edgedevice/ping")
        url: String,
        /// User-Agent header
        #[serde(default)]
        user_agent: Option<String>,
    },

    /// Custom probe
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProbeConfig {
    /// Validate the probe configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProbeConfig::Http { url, .. } => {
                if url.is_empty() {
                    return Err(crate::Error::config("HTTP probe URL cannot be empty"));
                }
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "HTTP probe URL must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                Ok(())
            }
            ProbeConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom probe factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom probe config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the probe type name
    pub fn type_name(&self) -> &str {
        match self {
            ProbeConfig::Http { .. } => "http",
            ProbeConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Publisher configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublisherConfig {
    /// JSON files in a directory, persisted across restarts
    File {
        /// Directory holding the published objects
        dir: PathBuf,
    },

    /// In-memory publisher (not persistent)
    #[default]
    Memory,

    /// Custom publisher
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl PublisherConfig {
    /// Validate the publisher configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            PublisherConfig::File { dir } if dir.as_os_str().is_empty() => {
                Err(crate::Error::config("File publisher directory cannot be empty"))
            }
            PublisherConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom publisher factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the publisher type name
    pub fn type_name(&self) -> &str {
        match self {
            PublisherConfig::File { .. } => "file",
            PublisherConfig::Memory => "memory",
            PublisherConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Timer configuration (all values in seconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Wait for an address or a transient condition before retesting
    #[serde(default = "default_dpc_test_duration_secs")]
    pub dpc_test_duration_secs: u64,

    /// Interval between re-tests of the applied configuration, and before
    /// a full re-scan when nothing in the list is testable
    #[serde(default = "default_network_test_interval_secs")]
    pub network_test_interval_secs: u64,

    /// When running on a lower priority candidate, look for a better one
    /// after this long. 0 disables.
    #[serde(default = "default_network_test_better_interval_secs")]
    pub network_test_better_interval_secs: u64,

    /// Timeout of a single reachability request
    #[serde(default = "default_test_send_timeout_secs")]
    pub test_send_timeout_secs: u64,
}

impl TimerConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.dpc_test_duration_secs == 0 {
            return Err(crate::Error::config("DPC test duration must be > 0"));
        }
        if self.network_test_interval_secs == 0 {
            return Err(crate::Error::config("Network test interval must be > 0"));
        }
        if self.test_send_timeout_secs == 0 {
            return Err(crate::Error::config("Test send timeout must be > 0"));
        }
        Ok(())
    }

    pub fn dpc_test_duration(&self) -> Duration {
        Duration::from_secs(self.dpc_test_duration_secs)
    }

    pub fn network_test_interval(&self) -> Duration {
        Duration::from_secs(self.network_test_interval_secs)
    }

    /// `None` when looking for a better candidate is disabled
    pub fn network_test_better_interval(&self) -> Option<Duration> {
        (self.network_test_better_interval_secs > 0)
            .then(|| Duration::from_secs(self.network_test_better_interval_secs))
    }

    pub fn test_send_timeout(&self) -> Duration {
        Duration::from_secs(self.test_send_timeout_secs)
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            dpc_test_duration_secs: default_dpc_test_duration_secs(),
            network_test_interval_secs: default_network_test_interval_secs(),
            network_test_better_interval_secs: default_network_test_better_interval_secs(),
            test_send_timeout_secs: default_test_send_timeout_secs(),
        }
    }
}

/// Verification loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Retry ceiling for local failures (no address yet, interface not bound)
    #[serde(default = "default_max_retest_count")]
    pub max_retest_count: u32,

    /// A failed candidate is skipped by the scan for this long
    #[serde(default = "default_retest_cooldown_secs")]
    pub retest_cooldown_secs: u64,

    /// Management interfaces that must reach the controller
    #[serde(default = "default_min_working_mgmt_ports")]
    pub min_working_mgmt_ports: usize,
}

impl VerifyConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.min_working_mgmt_ports == 0 {
            return Err(crate::Error::config("At least one working management port must be required"));
        }
        Ok(())
    }

    pub fn retest_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retest_cooldown_secs as i64)
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_retest_count: default_max_retest_count(),
            retest_cooldown_secs: default_retest_cooldown_secs(),
            min_working_mgmt_ports: default_min_working_mgmt_ports(),
        }
    }
}

fn default_resolv_conf_path() -> PathBuf {
    PathBuf::from(DEFAULT_RESOLV_CONF_PATH)
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_dpc_test_duration_secs() -> u64 {
    30
}

fn default_network_test_interval_secs() -> u64 {
    300
}

fn default_network_test_better_interval_secs() -> u64 {
    600
}

fn default_test_send_timeout_secs() -> u64 {
    15
}

fn default_max_retest_count() -> u32 {
    5
}

fn default_retest_cooldown_secs() -> u64 {
    60
}

fn default_min_working_mgmt_ports() -> usize {
    1
}
