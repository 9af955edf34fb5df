use clap::Args;
use cortex_core::agent::backend::DEFAULT_BASE_URL;
use cortex_core::agent::{AgentProfiles, DEFAULT_COGNITIVE_AGENT, DEFAULT_TRANSLATOR_AGENT};
use cortex_core::archive::DEFAULT_ARCHIVE_CAPACITY;
use cortex_core::reservoir::leaky::DEFAULT_SEED;
use cortex_core::reservoir::{DEFAULT_FANOUT, DEFAULT_NEURON_COUNT};
use cortex_core::CortexError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Returns the ~/.cortex directory, creating it if needed.
/// Falls back to a local `.cortex` directory if the home directory cannot be determined.
pub fn cortex_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(mut path) => {
            path.push(".cortex");
            if let Err(e) = fs::create_dir_all(&path) {
                warn!(error = %e, "Could not create ~/.cortex, falling back to local .cortex");
                let fallback = PathBuf::from(".cortex");
                let _ = fs::create_dir_all(&fallback);
                return fallback;
            }
            path
        }
        None => {
            warn!("Could not determine home directory, falling back to local .cortex");
            let fallback = PathBuf::from(".cortex");
            let _ = fs::create_dir_all(&fallback);
            fallback
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub reservoir: ReservoirConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservoirConfig {
    pub neuron_count: i32,
    pub fanout: i32,
    pub seed: u64,
    /// Period of the background heartbeat step
    pub tick_interval_ms: u64,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            neuron_count: DEFAULT_NEURON_COUNT,
            fanout: DEFAULT_FANOUT,
            seed: DEFAULT_SEED,
            tick_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound on each tier attempt
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_translator_agent")]
    pub translator_agent_id: String,
    #[serde(default = "default_cognitive_agent")]
    pub cognitive_agent_id: String,
    /// Overrides the per-role chat fallback model when set
    #[serde(default)]
    pub fallback_model: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_translator_agent() -> String {
    DEFAULT_TRANSLATOR_AGENT.to_string()
}

fn default_cognitive_agent() -> String {
    DEFAULT_COGNITIVE_AGENT.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_timeout_secs(),
            translator_agent_id: default_translator_agent(),
            cognitive_agent_id: default_cognitive_agent(),
            fallback_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub port: u16,
    /// Bind 0.0.0.0 instead of loopback
    pub public: bool,
    pub archive_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            public: false,
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
        }
    }
}

impl Config {
    pub fn get_config_path() -> PathBuf {
        let mut path = cortex_data_dir();
        path.push("config.toml");
        path
    }

    /// Load the default config file, writing the defaults on first run.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::get_config_path();

        if !path.exists() {
            let config = Config::default();
            config.save_to(&path)?;
            return Ok(config);
        }

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }
}

/// Environment layer. Each option can also be passed as a flag.
#[derive(Debug, Clone, Default, Args)]
pub struct EnvOverrides {
    /// Mistral API key (required for serve and cycle)
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Agent id for the translator role
    #[arg(long, env = "PIXTRAL_AGENT_ID")]
    pub translator_agent: Option<String>,

    /// Agent id for the cognitive role
    #[arg(long, env = "MAGISTRAL_AGENT_ID")]
    pub cognitive_agent: Option<String>,

    /// Chat-tier model used by both roles
    #[arg(long, env = "FALLBACK_MODEL")]
    pub fallback_model: Option<String>,

    /// API listen port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Bind on all interfaces
    #[arg(long, env = "CORTEX_PUBLIC")]
    pub public: bool,

    /// Base URL of the text-generation API
    #[arg(long, env = "MISTRAL_BASE_URL")]
    pub base_url: Option<String>,
}

/// Fully resolved runtime settings: environment > file > defaults.
#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub call_timeout: Duration,
    pub profiles: AgentProfiles,
    pub reservoir: ReservoirConfig,
    pub port: u16,
    pub public: bool,
    pub archive_capacity: usize,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string)
}

impl Settings {
    pub fn resolve(config: Config, env: &EnvOverrides) -> Result<Self, CortexError> {
        let api_key = non_empty(env.api_key.as_ref()).ok_or_else(|| {
            CortexError::Config("set MISTRAL_API_KEY environment variable before starting".to_string())
        })?;

        let mut profiles = AgentProfiles::default();
        profiles.translator.agent_id = non_empty(env.translator_agent.as_ref())
            .unwrap_or(config.agent.translator_agent_id);
        profiles.cognitive.agent_id = non_empty(env.cognitive_agent.as_ref())
            .unwrap_or(config.agent.cognitive_agent_id);
        for (role, id) in [
            ("translator", &profiles.translator.agent_id),
            ("cognitive", &profiles.cognitive.agent_id),
        ] {
            if id.trim().is_empty() {
                return Err(CortexError::Config(format!("no agent id configured for the {role} role")));
            }
        }
        if let Some(model) = non_empty(env.fallback_model.as_ref()).or(config.agent.fallback_model) {
            profiles = profiles.with_fallback_model(model);
        }

        Ok(Settings {
            api_key,
            base_url: non_empty(env.base_url.as_ref()).unwrap_or(config.agent.base_url),
            call_timeout: Duration::from_secs(config.agent.request_timeout_secs.max(1)),
            profiles,
            reservoir: config.reservoir,
            port: env.port.unwrap_or(config.api.port),
            public: env.public || config.api.public,
            archive_capacity: config.api.archive_capacity,
        })
    }

    pub fn bind_addr(&self) -> String {
        if self.public {
            format!("0.0.0.0:{}", self.port)
        } else {
            format!("127.0.0.1:{}", self.port)
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.reservoir.tick_interval_ms.max(1))
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("call_timeout", &self.call_timeout)
            .field("profiles", &self.profiles)
            .field("reservoir", &self.reservoir)
            .field("port", &self.port)
            .field("public", &self.public)
            .field("archive_capacity", &self.archive_capacity)
            .finish()
    }
}
