//! Configuration management for lawrag
//!
//! Configuration is loaded from a TOML file, then environment overrides and an
//! optional profile are applied, and finally the whole tree is validated.

use crate::error::{LawragError, Result};
use crate::retrieval::ContentKeyPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Supported configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub vector: VectorConfig,
    pub keyword: KeywordConfig,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Semantic backend: Qdrant plus the embedding API used to vectorize queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    pub qdrant_url: String,
    pub collection: String,
    pub embedding_api_url: String,
    /// Name of the environment variable holding the API key (empty = no auth)
    #[serde(default)]
    pub api_key_env: String,
}

/// Lexical backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordBackend {
    Elasticsearch,
    Tantivy,
}

impl FromStr for KeywordBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "elasticsearch" => Ok(Self::Elasticsearch),
            "tantivy" => Ok(Self::Tantivy),
            other => Err(format!(
                "Keyword backend must be 'elasticsearch' or 'tantivy', got '{}'",
                other
            )),
        }
    }
}

/// Lexical backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    pub backend: KeywordBackend,
    pub elasticsearch_url: String,
    pub index: String,
    /// Elasticsearch `fuzziness` parameter of the match query
    #[serde(default = "default_fuzziness")]
    pub fuzziness: String,
    pub tantivy_path: PathBuf,
}

fn default_fuzziness() -> String {
    "AUTO".to_string()
}

/// Fusion and orchestration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// RRF K constant
    pub rrf_k: u32,
    /// Each source is asked for `k * search_multiplier` candidates
    pub search_multiplier: usize,
    /// Per-source timeout applied to each search call
    pub source_timeout_ms: u64,
    /// Overall budget for one query, covering search and rerank
    pub query_deadline_ms: u64,
    /// Number of passages returned when the caller does not specify one
    pub default_k: usize,
    pub use_rerank: bool,
    #[serde(default)]
    pub content_key: ContentKeyPolicy,
}

impl RetrievalConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn query_deadline(&self) -> Duration {
        Duration::from_millis(self.query_deadline_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            search_multiplier: 2,
            source_timeout_ms: 5_000,
            query_deadline_ms: 30_000,
            default_k: 5,
            use_rerank: true,
            content_key: ContentKeyPolicy::Exact,
        }
    }
}

/// Cross-encoder backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankBackend {
    /// Remote rerank API
    Http,
    /// In-process fastembed cross-encoder
    Fastembed,
}

impl FromStr for RerankBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "fastembed" => Ok(Self::Fastembed),
            other => Err(format!(
                "Rerank backend must be 'http' or 'fastembed', got '{}'",
                other
            )),
        }
    }
}

/// Reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    pub backend: RerankBackend,
    pub api_url: String,
    #[serde(default)]
    pub api_key_env: String,
    pub model: String,
    pub timeout_ms: u64,
    /// Inference workers for the in-process backend
    pub workers: usize,
    /// Pending rerank jobs allowed before callers wait
    pub queue_capacity: usize,
}

impl RerankConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_rerank: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_backend: Option<KeywordBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_backend: Option<RerankBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_key: Option<ContentKeyPolicy>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LawragError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LawragError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LawragError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LawragError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| LawragError::ProfileNotFound {
                name: profile.to_string(),
            })?;

        if let Some(use_rerank) = overrides.use_rerank {
            self.retrieval.use_rerank = use_rerank;
        }
        if let Some(k) = overrides.default_k {
            self.retrieval.default_k = k;
        }
        if let Some(backend) = overrides.keyword_backend {
            self.keyword.backend = backend;
        }
        if let Some(backend) = overrides.rerank_backend {
            self.rerank.backend = backend;
        }
        if let Some(policy) = overrides.content_key {
            self.retrieval.content_key = policy;
        }

        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LAWRAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LAWRAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let invalid = |message: String| LawragError::InvalidConfigValue {
            path: path.to_string(),
            message,
        };

        match path {
            "VECTOR__QDRANT_URL" => self.vector.qdrant_url = value.to_string(),
            "VECTOR__COLLECTION" => self.vector.collection = value.to_string(),
            "VECTOR__EMBEDDING_API_URL" => self.vector.embedding_api_url = value.to_string(),
            "VECTOR__API_KEY_ENV" => self.vector.api_key_env = value.to_string(),
            "KEYWORD__BACKEND" => self.keyword.backend = value.parse().map_err(invalid)?,
            "KEYWORD__ELASTICSEARCH_URL" => self.keyword.elasticsearch_url = value.to_string(),
            "KEYWORD__INDEX" => self.keyword.index = value.to_string(),
            "KEYWORD__FUZZINESS" => self.keyword.fuzziness = value.to_string(),
            "KEYWORD__TANTIVY_PATH" => self.keyword.tantivy_path = PathBuf::from(value),
            "RETRIEVAL__RRF_K" => self.retrieval.rrf_k = parse_number(path, value)?,
            "RETRIEVAL__SEARCH_MULTIPLIER" => {
                self.retrieval.search_multiplier = parse_number(path, value)?
            }
            "RETRIEVAL__SOURCE_TIMEOUT_MS" => {
                self.retrieval.source_timeout_ms = parse_number(path, value)?
            }
            "RETRIEVAL__QUERY_DEADLINE_MS" => {
                self.retrieval.query_deadline_ms = parse_number(path, value)?
            }
            "RETRIEVAL__DEFAULT_K" => self.retrieval.default_k = parse_number(path, value)?,
            "RETRIEVAL__USE_RERANK" => {
                self.retrieval.use_rerank = value
                    .parse()
                    .map_err(|_| invalid(format!("Cannot parse '{}' as boolean", value)))?;
            }
            "RETRIEVAL__CONTENT_KEY" => {
                self.retrieval.content_key = value.parse().map_err(invalid)?;
            }
            "RERANK__BACKEND" => self.rerank.backend = value.parse().map_err(invalid)?,
            "RERANK__API_URL" => self.rerank.api_url = value.to_string(),
            "RERANK__API_KEY_ENV" => self.rerank.api_key_env = value.to_string(),
            "RERANK__MODEL" => self.rerank.model = value.to_string(),
            "RERANK__TIMEOUT_MS" => self.rerank.timeout_ms = parse_number(path, value)?,
            "RERANK__WORKERS" => self.rerank.workers = parse_number(path, value)?,
            "RERANK__QUEUE_CAPACITY" => self.rerank.queue_capacity = parse_number(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LawragError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lawrag").join("config.toml"))
    }
}

fn parse_number<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| LawragError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}' as integer", value),
    })
}

/// Read an API key from the environment variable named by `env_name`
///
/// Returns `None` when no variable is configured or it is unset or empty.
pub fn resolve_api_key(env_name: &str) -> Option<String> {
    if env_name.is_empty() {
        return None;
    }
    std::env::var(env_name).ok().filter(|key| !key.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lawrag");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            vector: VectorConfig {
                qdrant_url: "http://localhost:6333".to_string(),
                collection: "traffic_law".to_string(),
                embedding_api_url: "http://localhost:8080/v1/embeddings".to_string(),
                api_key_env: "LAWRAG_API_KEY".to_string(),
            },
            keyword: KeywordConfig {
                backend: KeywordBackend::Elasticsearch,
                elasticsearch_url: "http://localhost:9200".to_string(),
                index: "traffic_law".to_string(),
                fuzziness: default_fuzziness(),
                tantivy_path: data_dir.join("keywords"),
            },
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig {
                backend: RerankBackend::Http,
                api_url: "http://localhost:8081/v1/rerank".to_string(),
                api_key_env: "LAWRAG_API_KEY".to_string(),
                model: "BAAI/bge-reranker-v2-m3".to_string(),
                timeout_ms: 30_000,
                workers: 2,
                queue_capacity: 64,
            },
            profiles: HashMap::new(),
        }
    }
}
