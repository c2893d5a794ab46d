use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub stores: StoreConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub arbiter: ArbiterConfig,

    #[serde(default)]
    pub judge: JudgeConfig,

    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_suspect_file")]
    pub suspect: String,
    #[serde(default = "default_whitelist_file")]
    pub whitelist: String,
    #[serde(default = "default_blacklist_file")]
    pub blacklist: String,
    #[serde(rename = "final", default = "default_final_file")]
    pub final_list: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatcherConfig {
    /// Scores strictly above this are flagged as suspect.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,
    #[serde(default = "default_cache_refresh_secs")]
    pub cache_refresh_secs: u64,
    #[serde(default = "default_queue")]
    pub queue: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScorerConfig {
    #[serde(default = "default_scorer_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_scorer_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_warmup_domain")]
    pub warmup_domain: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArbiterConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    #[serde(default = "default_polite_delay_ms")]
    pub polite_delay_ms: u64,
    #[serde(default = "default_evidence_timeout_secs")]
    pub evidence_timeout_secs: u64,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_description_max_chars")]
    pub description_max_chars: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_base_url")]
    pub base_url: String,
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_judge_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReconcilerConfig {
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_blocklists")]
    pub blocklists: HashMap<String, String>,
    #[serde(default = "default_allowlists")]
    pub allowlists: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_verdict_sinks")]
    pub verdict_sinks: Vec<String>,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_sqlite_retention_hours")]
    pub sqlite_retention_hours: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enable")]
    pub enable: bool,
    #[serde(default = "default_log_interval")]
    pub log_interval_seconds: u64,
}

// Defaults
fn default_data_dir() -> PathBuf {
    PathBuf::from("data/blocklists")
}
fn default_suspect_file() -> String {
    "ai_blocks.txt".to_string()
}
fn default_whitelist_file() -> String {
    "whitelist.txt".to_string()
}
fn default_blacklist_file() -> String {
    "blacklist.txt".to_string()
}
fn default_final_file() -> String {
    "final_blocklist.txt".to_string()
}
fn default_threshold() -> f32 {
    0.90
}
fn default_pop_timeout_ms() -> u64 {
    1000
}
fn default_cache_refresh_secs() -> u64 {
    300
}
fn default_queue() -> String {
    "stdin".to_string()
}
fn default_scorer_endpoint() -> String {
    "http://127.0.0.1:8000/score".to_string()
}
fn default_scorer_timeout_ms() -> u64 {
    2000
}
fn default_warmup_domain() -> String {
    "example.com".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_rate_limit_backoff_secs() -> u64 {
    10
}
fn default_polite_delay_ms() -> u64 {
    2000
}
fn default_evidence_timeout_secs() -> u64 {
    5
}
fn default_title_max_chars() -> usize {
    100
}
fn default_description_max_chars() -> usize {
    200
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}
fn default_judge_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}
fn default_judge_model() -> String {
    "gemma-3-12b-it".to_string()
}
fn default_api_key_env() -> String {
    "API_KEY".to_string()
}
fn default_judge_timeout_secs() -> u64 {
    30
}
fn default_concurrent_downloads() -> usize {
    4
}
fn default_fetch_timeout_secs() -> u64 {
    45
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_verdict_sinks() -> Vec<String> {
    vec!["console".to_string()]
}
fn default_sqlite_path() -> String {
    "dns-warden.db".to_string()
}
fn default_sqlite_retention_hours() -> u64 {
    24 * 90
}
fn default_stats_enable() -> bool {
    true
}
fn default_log_interval() -> u64 {
    300
}
fn default_blocklists() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert(
        "OISD Big".to_string(),
        "https://big.oisd.nl/domainswild".to_string(),
    );
    m.insert(
        "StevenBlack (Gambling+Porn)".to_string(),
        "https://raw.githubusercontent.com/StevenBlack/hosts/master/alternates/gambling-porn/hosts"
            .to_string(),
    );
    m.insert(
        "Hagezi Pro++".to_string(),
        "https://raw.githubusercontent.com/hagezi/dns-blocklists/main/domains/pro.plus.txt"
            .to_string(),
    );
    m.insert(
        "Sinfonietta Porn".to_string(),
        "https://raw.githubusercontent.com/Sinfonietta/hostfiles/master/pornography-hosts"
            .to_string(),
    );
    m
}
fn default_allowlists() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert(
        "Community Whitelist".to_string(),
        "https://raw.githubusercontent.com/anudeepND/whitelist/master/domains/whitelist.txt"
            .to_string(),
    );
    m.insert(
        "Hagezi Whitelist".to_string(),
        "https://raw.githubusercontent.com/hagezi/dns-blocklists/main/domains/whitelist.txt"
            .to_string(),
    );
    m
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            suspect: default_suspect_file(),
            whitelist: default_whitelist_file(),
            blacklist: default_blacklist_file(),
            final_list: default_final_file(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            pop_timeout_ms: default_pop_timeout_ms(),
            cache_refresh_secs: default_cache_refresh_secs(),
            queue: default_queue(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_scorer_endpoint(),
            timeout_ms: default_scorer_timeout_ms(),
            warmup_domain: default_warmup_domain(),
        }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            polite_delay_ms: default_polite_delay_ms(),
            evidence_timeout_secs: default_evidence_timeout_secs(),
            title_max_chars: default_title_max_chars(),
            description_max_chars: default_description_max_chars(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_judge_base_url(),
            model: default_judge_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_judge_timeout_secs(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: default_concurrent_downloads(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            blocklists: default_blocklists(),
            allowlists: default_allowlists(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            verdict_sinks: default_verdict_sinks(),
            sqlite_path: default_sqlite_path(),
            sqlite_retention_hours: default_sqlite_retention_hours(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable: default_stats_enable(),
            log_interval_seconds: default_log_interval(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }
}

impl ReconcilerConfig {
    /// Block sources ordered by name so runs are deterministic.
    pub fn blocklists_sorted(&self) -> Vec<(String, String)> {
        sorted(&self.blocklists)
    }

    pub fn allowlists_sorted(&self) -> Vec<(String, String)> {
        sorted(&self.allowlists)
    }
}

fn sorted(map: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut list: Vec<_> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    list.sort_by(|a, b| a.0.cmp(&b.0));
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
            [dispatcher]
            threshold = 0.75

            [reconciler.blocklists]
            "b-list" = "http://b.example/list.txt"
            "a-list" = "http://a.example/list.txt"
        "#;
        let config: Config = toml::from_str(raw).unwrap();

        assert_eq!(config.dispatcher.threshold, 0.75);
        assert_eq!(config.dispatcher.cache_refresh_secs, 300);
        assert_eq!(config.arbiter.max_attempts, 3);
        assert_eq!(config.stores.suspect, "ai_blocks.txt");

        let names: Vec<_> = config
            .reconciler
            .blocklists_sorted()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["a-list", "b-list"]);
        // Allowlists were not overridden.
        assert_eq!(config.reconciler.allowlists.len(), 2);
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.dispatcher.threshold, 0.90);
        assert_eq!(config.dispatcher.pop_timeout_ms, 1000);
        assert_eq!(config.arbiter.rate_limit_backoff_secs, 10);
        assert_eq!(config.arbiter.evidence_timeout_secs, 5);
        assert_eq!(config.reconciler.blocklists.len(), 4);
    }

    #[test]
    fn test_final_store_key() {
        let raw = r#"
            [stores]
            final = "hosts.blocked"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.stores.final_list, "hosts.blocked");
        assert_eq!(config.stores.whitelist, "whitelist.txt");
    }
}
