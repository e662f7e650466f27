use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Process-wide configuration, parseable from CLI flags, environment
/// variables, or an on-disk override file (whichever field sources win,
/// `clap` applies them in that order).
#[derive(Serialize, Deserialize, Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Configuration {
    #[clap(long, env = "ORCHESTRATOR_HOST", default_value_t = default_host())]
    #[serde(default = "default_host")]
    pub host: String,

    #[clap(long, env = "ORCHESTRATOR_PORT", default_value_t = default_port())]
    #[serde(default = "default_port")]
    pub port: u16,

    #[clap(long, env = "ORCHESTRATOR_WORKSPACE_ROOT", default_value_os_t = default_workspace_root())]
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    #[clap(long, env = "ORCHESTRATOR_LOG_DIR", default_value_os_t = default_log_dir())]
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[clap(long, env = "ORCHESTRATOR_LLM_ENDPOINT", default_value_t = default_llm_endpoint())]
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,

    #[clap(long, env = "ORCHESTRATOR_LLM_MODEL", default_value_t = default_llm_model())]
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// `ollama` (default, local inference server) or `openai_compatible`
    /// (hosted-but-API-compatible endpoint, requires `llm_api_key`).
    #[clap(long, env = "ORCHESTRATOR_LLM_PROVIDER", default_value_t = default_llm_provider())]
    #[serde(default = "default_llm_provider")]
    pub llm_provider: String,

    #[clap(long, env = "ORCHESTRATOR_LLM_API_KEY", default_value = "")]
    #[serde(default)]
    pub llm_api_key: String,

    #[clap(long, env = "FUNNEL_DISCOVERY_PORT", default_value_t = default_discovery_port())]
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    #[clap(long, env = "FUNNEL_DISCOVERY_TIMEOUT", default_value_t = default_discovery_timeout())]
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: f64,

    #[clap(long, env = "FUNNEL_HOST_ADDRESS", default_value = "")]
    #[serde(default)]
    pub host_address: String,

    #[clap(long, env = "FUNNEL_INSECURE")]
    #[serde(default)]
    pub insecure: bool,

    #[clap(long, env = "FUNNEL_CA_FINGERPRINT", default_value = "")]
    #[serde(default)]
    pub ca_fingerprint: String,

    #[clap(long, env = "ORCHESTRATOR_CERT_PATH", default_value_os_t = default_cert_path())]
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,

    #[clap(long, env = "ORCHESTRATOR_KEY_PATH", default_value_os_t = default_key_path())]
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,

    #[clap(long, env = "CA_CERT_PATH", default_value_os_t = default_ca_cert_path())]
    #[serde(default = "default_ca_cert_path")]
    pub ca_cert_path: PathBuf,

    #[clap(long, default_value_t = default_discovery_cache_ttl())]
    #[serde(default = "default_discovery_cache_ttl")]
    pub discovery_cache_ttl_secs: u64,

    #[clap(long, default_value_t = default_max_reasoning_steps())]
    #[serde(default = "default_max_reasoning_steps")]
    pub max_reasoning_steps: usize,

    #[clap(long, default_value_t = default_max_driver_steps())]
    #[serde(default = "default_max_driver_steps")]
    pub max_driver_steps: usize,

    #[clap(long, default_value_t = default_max_sessions())]
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[clap(long, env = "ORCHESTRATOR_USER_ID", default_value_t = default_user_id())]
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workspace_root: default_workspace_root(),
            log_dir: default_log_dir(),
            llm_endpoint: default_llm_endpoint(),
            llm_model: default_llm_model(),
            llm_provider: default_llm_provider(),
            llm_api_key: String::new(),
            discovery_port: default_discovery_port(),
            discovery_timeout_secs: default_discovery_timeout(),
            host_address: String::new(),
            insecure: false,
            ca_fingerprint: String::new(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
            ca_cert_path: default_ca_cert_path(),
            discovery_cache_ttl_secs: default_discovery_cache_ttl(),
            max_reasoning_steps: default_max_reasoning_steps(),
            max_driver_steps: default_max_driver_steps(),
            max_sessions: default_max_sessions(),
            user_id: default_user_id(),
        }
    }
}

impl Configuration {
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone()
    }

    /// True only once all three mTLS material paths exist on disk.
    pub fn has_mtls_material(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists() && self.ca_cert_path.exists()
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("cloud", "funnel", "orchestrator")
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8787
}

fn default_workspace_root() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_log_dir() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().join("logs"),
        None => PathBuf::from("orchestrator_logs"),
    }
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:11434".to_owned()
}

fn default_llm_model() -> String {
    "llama3".to_owned()
}

fn default_llm_provider() -> String {
    "ollama".to_owned()
}

fn default_discovery_port() -> u16 {
    41234
}

fn default_discovery_timeout() -> f64 {
    2.0
}

fn default_cert_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.config_dir().join("client.crt"),
        None => PathBuf::from("client.crt"),
    }
}

fn default_key_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.config_dir().join("client.key"),
        None => PathBuf::from("client.key"),
    }
}

fn default_ca_cert_path() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.config_dir().join("ca.crt"),
        None => PathBuf::from("ca.crt"),
    }
}

fn default_discovery_cache_ttl() -> u64 {
    300
}

fn default_max_reasoning_steps() -> usize {
    15
}

fn default_max_driver_steps() -> usize {
    10
}

fn default_max_sessions() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 4)
        .unwrap_or(16)
}

fn default_user_id() -> String {
    whoami::username()
}
