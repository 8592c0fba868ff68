use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    env,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config `{path}`: {message}")]
    Read { path: String, message: String },
    #[error("invalid config `{path}`: {message}")]
    Parse { path: String, message: String },
    #[error("task `{task}` references unknown endpoint `{endpoint}`")]
    UnknownEndpoint { task: String, endpoint: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub device: Map<String, Value>,
    #[serde(default)]
    pub parsing: ParsingConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub detail_endpoint: Option<String>,
    #[serde(default)]
    pub image_cdn: String,
    #[serde(default = "default_accepted_codes")]
    pub accepted_codes: Vec<i64>,
    #[serde(default = "default_page_param")]
    pub page_param: String,
    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsingConfig {
    #[serde(default = "default_max_products")]
    pub max_products: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            max_products: default_max_products(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            max_images: default_max_images(),
            upload_dir: default_upload_dir(),
            checkpoint_dir: default_checkpoint_dir(),
            output_dir: default_output_dir(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_source_lang")]
    pub source_lang: String,
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    #[serde(default = "default_translate_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_translate_endpoint(),
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            timeout_secs: default_translate_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub brand_filter: Option<String>,
    #[serde(default = "default_true")]
    pub price_in_cents: bool,
    #[serde(default = "default_true")]
    pub market_price_in_cents: bool,
}

impl TaskConfig {
    /// Checkpoint and output files are keyed by a filesystem-safe slug of the task name.
    pub fn batch_key(&self) -> String {
        slugify(&self.name)
    }

    pub fn brand_id(&self) -> Option<String> {
        self.payload.get("brandId").map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Accepts YAML or JSON; YAML is a superset of the JSON the catalog tooling ships with.
impl FromStr for AppConfig {
    type Err = serde_yaml::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(raw)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let mut config = raw.parse::<Self>().map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("CATALOG_BASE_URL")
            && !url.trim().is_empty()
        {
            self.api.base_url = url;
        }
        if let Ok(cdn) = env::var("CATALOG_IMAGE_CDN")
            && !cdn.trim().is_empty()
        {
            self.api.image_cdn = cdn;
        }
        if let Some(max) = env_usize("MAX_PRODUCTS") {
            self.parsing.max_products = max;
        }
        if let Some(size) = env_usize("BATCH_SIZE") {
            self.parsing.batch_size = size;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for task in &self.tasks {
            if !self.api.endpoints.contains_key(&task.endpoint) {
                return Err(ConfigError::UnknownEndpoint {
                    task: task.name.clone(),
                    endpoint: task.endpoint.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn endpoint_url(&self, name: &str) -> Option<String> {
        self.api
            .endpoints
            .get(name)
            .map(|path| join_url(&self.api.base_url, path))
    }

    pub fn detail_url(&self) -> Option<String> {
        self.api
            .detail_endpoint
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(|path| {
                self.api
                    .endpoints
                    .get(path)
                    .map(|resolved| join_url(&self.api.base_url, resolved))
                    .unwrap_or_else(|| join_url(&self.api.base_url, path))
            })
    }

    /// Named task (case-insensitive) or every enabled task.
    pub fn select_tasks(&self, name: Option<&str>) -> Vec<&TaskConfig> {
        match name {
            Some(wanted) => self
                .tasks
                .iter()
                .filter(|task| task.name.eq_ignore_ascii_case(wanted.trim()))
                .collect(),
            None => self.tasks.iter().filter(|task| task.enabled).collect(),
        }
    }
}

pub fn slugify(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim_end().replace(' ', "_").to_lowercase()
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
}

fn default_accepted_codes() -> Vec<i64> {
    vec![0, 200]
}

fn default_page_param() -> String {
    "page".into()
}

fn default_page_size_param() -> String {
    "pageSize".into()
}

fn default_max_products() -> usize {
    100
}

fn default_page_size() -> usize {
    20
}

fn default_batch_size() -> usize {
    10
}

fn default_max_images() -> usize {
    5
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_currency() -> String {
    "CNY".into()
}

fn default_true() -> bool {
    true
}

fn default_translate_endpoint() -> String {
    "https://translate.googleapis.com/translate_a/single".into()
}

fn default_source_lang() -> String {
    "zh-CN".into()
}

fn default_target_lang() -> String {
    "ru".into()
}

fn default_translate_timeout_secs() -> u64 {
    10
}
