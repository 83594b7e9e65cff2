use std::collections::HashMap;

use serde::Deserialize;

use crate::types::ResourceCategory;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_depth: u32,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_pages: u64,
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,
    #[serde(default)]
    pub resume: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_depth: 0,
            max_pages: 0,
            max_body_size_mb: default_max_body_size_mb(),
            resume: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// e.g. `http://127.0.0.1:7890`
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            min_delay_ms: default_min_delay_ms(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            proxy: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MirrorConfig {
    /// Hosts whose pages are followed. Empty = host of the start URL.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default = "default_true")]
    pub follow_pages: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            follow_pages: true,
        }
    }
}

/// Extension overrides merged over the built-in table, e.g. `avif = "image"`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub extensions: HashMap<String, ResourceCategory>,
}

/// Replaces the built-in CDN unwrap list when non-empty.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NormalizerConfig {
    #[serde(default)]
    pub unwrap_rules: Vec<UnwrapRuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UnwrapRuleConfig {
    pub pattern: String,
    pub replacement: String,
}

fn default_output_dir() -> String { "downloads".to_string() }
fn default_max_body_size_mb() -> usize { 50 }
fn default_max_concurrency() -> usize { 16 }
fn default_min_delay_ms() -> u64 { 500 }
fn default_connect_timeout() -> u64 { 15 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 2 }
fn default_true() -> bool { true }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36".to_string()
}
