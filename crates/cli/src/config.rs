//! Run configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use sitewatch_harness::links::default_concurrency;
use sitewatch_harness::{AvailabilityPolicy, DispatchSettings, WaitPolicy, WebDriverConfig};

/// Top-level configuration, read from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteWatchConfig {
    /// Sheet of rows to run
    pub input_csv: PathBuf,

    /// Annotated copy of the sheet
    #[serde(default = "default_output_csv")]
    pub output_csv: PathBuf,

    /// JSON run report, skipped when unset
    #[serde(default)]
    pub report_json: Option<PathBuf>,

    /// Timeout of a single HTTP probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default)]
    pub webdriver: WebDriverConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

fn default_output_csv() -> PathBuf {
    PathBuf::from("output.csv")
}

fn default_probe_timeout_secs() -> u64 {
    30
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Wait budget for ordinary element lookups
    #[serde(default = "default_wait_ms")]
    pub default_wait_ms: u64,

    /// Wait budget for the Mirador viewer
    #[serde(default = "default_viewer_wait_ms")]
    pub viewer_wait_ms: u64,

    #[serde(default = "default_check_timeout_secs")]
    pub check_timeout_secs: u64,

    /// Parallel link probes (defaults to the number of cores)
    #[serde(default)]
    pub link_concurrency: Option<usize>,

    #[serde(default)]
    pub availability: AvailabilityPolicy,
}

fn default_wait_ms() -> u64 {
    20_000
}

fn default_viewer_wait_ms() -> u64 {
    40_000
}

fn default_check_timeout_secs() -> u64 {
    300
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_wait_ms: default_wait_ms(),
            viewer_wait_ms: default_viewer_wait_ms(),
            check_timeout_secs: default_check_timeout_secs(),
            link_concurrency: None,
            availability: AvailabilityPolicy::default(),
        }
    }
}

impl DispatchConfig {
    pub fn settings(&self) -> DispatchSettings {
        DispatchSettings {
            waits: WaitPolicy {
                element: Duration::from_millis(self.default_wait_ms),
                mirador: Duration::from_millis(self.viewer_wait_ms),
            },
            availability: self.availability.clone(),
            check_timeout: Duration::from_secs(self.check_timeout_secs),
            link_concurrency: self.link_concurrency.unwrap_or_else(default_concurrency),
        }
    }
}

impl SiteWatchConfig {
    /// Defaults for everything but the input sheet
    pub fn for_input(input_csv: PathBuf) -> Self {
        Self {
            input_csv,
            output_csv: default_output_csv(),
            report_json: None,
            probe_timeout_secs: default_probe_timeout_secs(),
            webdriver: WebDriverConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Load a `.yml`/`.yaml` configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => {}
            _ => bail!("Config file {} must have a .yml or .yaml extension", path.display()),
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        if config.dispatch.check_timeout_secs == 0 {
            bail!("dispatch.check_timeout_secs must be greater than zero");
        }
        Ok(config)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
