use crate::config::{Config, KeywordBackend, RerankBackend, SCHEMA_VERSION};
use crate::error::{LawragError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_vector(config, &mut errors);
        Self::validate_keyword(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_rerank(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LawragError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_vector(config: &Config, errors: &mut Vec<ValidationError>) {
        Self::require_http_url("vector.qdrant_url", &config.vector.qdrant_url, errors);
        Self::require_http_url(
            "vector.embedding_api_url",
            &config.vector.embedding_api_url,
            errors,
        );

        if config.vector.collection.is_empty() {
            errors.push(ValidationError::new(
                "vector.collection",
                "Collection name cannot be empty",
            ));
        }
    }

    fn validate_keyword(config: &Config, errors: &mut Vec<ValidationError>) {
        match config.keyword.backend {
            KeywordBackend::Elasticsearch => {
                Self::require_http_url(
                    "keyword.elasticsearch_url",
                    &config.keyword.elasticsearch_url,
                    errors,
                );
                if config.keyword.index.is_empty() {
                    errors.push(ValidationError::new(
                        "keyword.index",
                        "Index name cannot be empty",
                    ));
                }
            }
            KeywordBackend::Tantivy => {
                // Existence is checked when the index is opened
                if config.keyword.tantivy_path.as_os_str().is_empty() {
                    errors.push(ValidationError::new(
                        "keyword.tantivy_path",
                        "Tantivy index path cannot be empty",
                    ));
                }
            }
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.rrf_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                "RRF K must be greater than 0",
            ));
        }

        if retrieval.search_multiplier < 2 {
            errors.push(ValidationError::new(
                "retrieval.search_multiplier",
                format!(
                    "Search multiplier must be at least 2, got {}",
                    retrieval.search_multiplier
                ),
            ));
        }

        if retrieval.source_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.source_timeout_ms",
                "Source timeout must be greater than 0",
            ));
        }

        if retrieval.query_deadline_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.query_deadline_ms",
                "Query deadline must be greater than 0",
            ));
        }

        if retrieval.default_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_k",
                "Default k must be greater than 0",
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        let rerank = &config.rerank;

        if rerank.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "rerank.timeout_ms",
                "Rerank timeout must be greater than 0",
            ));
        }

        match rerank.backend {
            RerankBackend::Http => {
                Self::require_http_url("rerank.api_url", &rerank.api_url, errors);
            }
            RerankBackend::Fastembed => {
                if rerank.model.is_empty() {
                    errors.push(ValidationError::new(
                        "rerank.model",
                        "Model name cannot be empty",
                    ));
                }
                if rerank.workers == 0 {
                    errors.push(ValidationError::new(
                        "rerank.workers",
                        "Worker count must be greater than 0",
                    ));
                }
                if rerank.queue_capacity == 0 {
                    errors.push(ValidationError::new(
                        "rerank.queue_capacity",
                        "Queue capacity must be greater than 0",
                    ));
                }
            }
        }
    }

    fn require_http_url(path: &str, url: &str, errors: &mut Vec<ValidationError>) {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::new(
                path,
                format!("Expected an http(s) URL, got '{}'", url),
            ));
        }
    }
}
