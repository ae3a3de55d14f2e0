//! Client configuration
//!
//! A TOML document is read once at process start and turned into a validated
//! [`ClientConfig`]. Invalid mode/credential combinations fail here, before
//! any inbox is provisioned.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::links::LinkSettings;
use crate::types::Role;

/// Default hosted mailbox API endpoint
pub const DEFAULT_LIVE_BASE_URL: &str = "https://api.mailslurp.com";

/// Which backend supplies inboxes and messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMode {
    Live,
    #[default]
    Fake,
    Hardcoded,
}

impl ProviderMode {
    /// Hardcoded addresses are for manual runs: nothing confirms a message
    /// was ever delivered unless one is supplied out-of-band
    pub fn verifies_delivery(&self) -> bool {
        !matches!(self, ProviderMode::Hardcoded)
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderMode::Live => f.write_str("live"),
            ProviderMode::Fake => f.write_str("fake"),
            ProviderMode::Hardcoded => f.write_str("hardcoded"),
        }
    }
}

impl std::str::FromStr for ProviderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(ProviderMode::Live),
            "fake" => Ok(ProviderMode::Fake),
            "hardcoded" => Ok(ProviderMode::Hardcoded),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown provider mode '{}' (expected live, fake or hardcoded)",
                other
            ))),
        }
    }
}

/// Credentials for the hosted mailbox API
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCredentials {
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Idle connections kept per host; concurrent polls share the pool
    #[serde(default = "default_pool_size")]
    pub max_idle_connections: usize,
}

fn default_base_url() -> String {
    DEFAULT_LIVE_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_pool_size() -> usize {
    8
}

impl LiveCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_idle_connections: default_pool_size(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl fmt::Debug for LiveCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveCredentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_idle_connections", &self.max_idle_connections)
            .finish()
    }
}

/// Fake backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeSettings {
    /// Domain for synthesized addresses
    #[serde(default = "default_fake_domain")]
    pub domain: String,

    /// Directory of YAML scenario files registered at startup
    #[serde(default)]
    pub scenarios_dir: Option<PathBuf>,
}

fn default_fake_domain() -> String {
    "fake.mailwatch.test".to_string()
}

impl Default for FakeSettings {
    fn default() -> Self {
        Self {
            domain: default_fake_domain(),
            scenarios_dir: None,
        }
    }
}

/// Backend selection, resolved once and injected into the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub mode: ProviderMode,

    #[serde(default, rename = "live")]
    pub credentials: Option<LiveCredentials>,

    #[serde(default, rename = "hardcoded")]
    pub hardcoded_addresses: BTreeMap<Role, String>,

    #[serde(default)]
    pub fake: FakeSettings,
}

impl ProviderConfig {
    pub fn live(credentials: LiveCredentials) -> Self {
        Self {
            mode: ProviderMode::Live,
            credentials: Some(credentials),
            ..Self::default()
        }
    }

    pub fn fake() -> Self {
        Self::default()
    }

    pub fn hardcoded<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = (Role, S)>,
        S: Into<String>,
    {
        Self {
            mode: ProviderMode::Hardcoded,
            hardcoded_addresses: addresses.into_iter().map(|(r, a)| (r, a.into())).collect(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.mode {
            ProviderMode::Live => {
                let creds = self.credentials.as_ref().ok_or_else(|| {
                    Error::InvalidConfiguration("live mode requires [provider.live] credentials".into())
                })?;
                if creds.api_key.trim().is_empty() {
                    return Err(Error::InvalidConfiguration(
                        "live mode requires a non-empty api_key".into(),
                    ));
                }
                let url = url::Url::parse(&creds.base_url).map_err(|e| {
                    Error::InvalidConfiguration(format!("live base_url '{}': {}", creds.base_url, e))
                })?;
                if url.cannot_be_a_base() {
                    return Err(Error::InvalidConfiguration(format!(
                        "live base_url '{}' is not an http(s) URL",
                        creds.base_url
                    )));
                }
                if creds.request_timeout_secs == 0 {
                    return Err(Error::InvalidConfiguration(
                        "live request_timeout_secs must be positive".into(),
                    ));
                }
            }
            ProviderMode::Hardcoded => {
                if self.hardcoded_addresses.is_empty() {
                    return Err(Error::InvalidConfiguration(
                        "hardcoded mode requires at least one address under [provider.hardcoded]".into(),
                    ));
                }
                for (role, address) in &self.hardcoded_addresses {
                    if !address.contains('@') || address.trim().len() != address.len() {
                        return Err(Error::InvalidConfiguration(format!(
                            "hardcoded address for {} is not an email address: '{}'",
                            role, address
                        )));
                    }
                }
            }
            ProviderMode::Fake => {
                if self.fake.domain.trim().is_empty() {
                    return Err(Error::InvalidConfiguration("fake.domain must not be empty".into()));
                }
            }
        }
        Ok(())
    }
}

/// Poll cadence as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_interval_secs() -> f64 {
    30.0
}

fn default_timeout_secs() -> f64 {
    600.0
}

fn default_max_retries() -> u32 {
    10
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Validated poll cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// Fetches after the first one; the wait ends when either this or the
    /// timeout is exhausted
    pub max_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
            max_retries: 10,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidConfiguration("poll interval must be positive".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfiguration("poll timeout must be positive".into()));
        }
        Ok(())
    }
}

impl TryFrom<&PollSettings> for PollPolicy {
    type Error = Error;

    fn try_from(settings: &PollSettings) -> Result<Self> {
        let secs = |name: &str, value: f64| {
            Duration::try_from_secs_f64(value).map_err(|_| {
                Error::InvalidConfiguration(format!("poll.{} must be a non-negative number, got {}", name, value))
            })
        };
        let policy = PollPolicy {
            interval: secs("interval_secs", settings.interval_secs)?,
            timeout: secs("timeout_secs", settings.timeout_secs)?,
            max_retries: settings.max_retries,
        };
        policy.validate()?;
        Ok(policy)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Raise `ContentMismatch` instead of returning a failing report for
    /// the caller to assert on
    #[serde(default)]
    pub strict: bool,
}

/// The config file as written on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub poll: PollSettings,

    #[serde(default)]
    pub links: LinkSettings,

    #[serde(default)]
    pub validation: ValidationSettings,

    /// YAML template catalog replacing the built-in one
    #[serde(default)]
    pub templates: Option<PathBuf>,
}

impl ConfigFile {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

/// Fully resolved client configuration with every default applied
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub provider: ProviderConfig,
    pub poll: PollPolicy,
    pub links: LinkSettings,
    pub strict: bool,
    pub templates: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            poll: PollPolicy::default(),
            links: LinkSettings::default(),
            strict: false,
            templates: None,
        }
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        Self::try_from(ConfigFile::load(path)?)
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_links(mut self, links: LinkSettings) -> Self {
        self.links = links;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_templates(mut self, path: impl Into<PathBuf>) -> Self {
        self.templates = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;
        self.poll.validate()?;
        if let Some(path) = &self.templates {
            if !path.is_file() {
                return Err(Error::InvalidConfiguration(format!(
                    "template catalog {} does not exist",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<ConfigFile> for ClientConfig {
    type Error = Error;

    fn try_from(file: ConfigFile) -> Result<Self> {
        let config = ClientConfig {
            poll: PollPolicy::try_from(&file.poll)?,
            provider: file.provider,
            links: file.links,
            strict: file.validation.strict,
            templates: file.templates,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_fake_and_lenient() {
        let config = ClientConfig::try_from(ConfigFile::from_toml("").unwrap()).unwrap();
        assert_eq!(config.provider.mode, ProviderMode::Fake);
        assert!(!config.strict);
        assert!(!ClientConfig::new(ProviderConfig::fake()).strict);

        let strict = ConfigFile::from_toml("[validation]\nstrict = true\n")
            .and_then(ClientConfig::try_from)
            .unwrap();
        assert!(strict.strict);
        assert_eq!(config.poll, PollPolicy::default());
    }

    #[test]
    fn test_parse_live_config() {
        let toml = r#"
[provider]
mode = "live"

[provider.live]
api_key = "k-123"
base_url = "http://127.0.0.1:9999"

[poll]
interval_secs = 0.5
timeout_secs = 2

[links]
base_domain = "shop.test"

[[links.rules]]
category = "activation"
path = "/activate/[a-z0-9]+"
"#;
        let config = ClientConfig::try_from(ConfigFile::from_toml(toml).unwrap()).unwrap();
        assert_eq!(config.provider.mode, ProviderMode::Live);
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.poll.timeout, Duration::from_secs(2));
        assert_eq!(config.links.rules.len(), 1);
        let creds = config.provider.credentials.unwrap();
        assert_eq!(creds.request_timeout_secs, 30);
        assert!(!format!("{:?}", creds).contains("k-123"));
    }

    #[test]
    fn test_live_without_credentials_rejected() {
        let err = ConfigFile::from_toml("[provider]\nmode = \"live\"\n")
            .and_then(ClientConfig::try_from)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));

        let empty_key = ProviderConfig::live(LiveCredentials::new("  "));
        assert!(matches!(empty_key.validate(), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_hardcoded_requires_address() {
        let toml = "[provider]\nmode = \"hardcoded\"\n";
        assert!(ConfigFile::from_toml(toml).and_then(ClientConfig::try_from).is_err());

        let toml = "[provider]\nmode = \"hardcoded\"\n[provider.hardcoded]\npurchaser = \"ops@shop.test\"\n";
        let config = ConfigFile::from_toml(toml).and_then(ClientConfig::try_from).unwrap();
        assert_eq!(
            config.provider.hardcoded_addresses.get(&Role::Purchaser).map(String::as_str),
            Some("ops@shop.test")
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let toml = "[poll]\ninterval_secs = 0\n";
        assert!(matches!(
            ConfigFile::from_toml(toml).and_then(ClientConfig::try_from),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("LIVE".parse::<ProviderMode>().unwrap(), ProviderMode::Live);
        assert!("smtp".parse::<ProviderMode>().is_err());
        assert!(!ProviderMode::Hardcoded.verifies_delivery());
    }
}
