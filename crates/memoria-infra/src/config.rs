//! Configuration loader for Memoria.
//!
//! Reads `config.toml` from the data directory (`~/.memoria/` by default)
//! into [`MemoriaConfig`]. A missing or malformed file falls back to the
//! defaults.

use std::path::Path;

use memoria_types::config::MemoriaConfig;

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults, logged at debug.
/// - Unreadable or unparsable file: defaults, logged at warn.
pub async fn load_config(data_dir: &Path) -> MemoriaConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return MemoriaConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return MemoriaConfig::default();
        }
    };

    match toml::from_str::<MemoriaConfig>(&content) {
        Ok(config) => {
            if config.search.vector_weight < 0.0 || config.search.text_weight < 0.0 {
                tracing::warn!(
                    vector_weight = config.search.vector_weight,
                    text_weight = config.search.text_weight,
                    "negative search weights configured in {}",
                    config_path.display()
                );
            }
            config
        }
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            MemoriaConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_types::config::EmbeddingProviderKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.search.candidate_floor, 20);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hashing);
    }

    #[tokio::test]
    async fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[search]
default_threshold = 0.4

[embedding]
provider = "http"
model = "nomic-embed-text"
dimension = 768

[backfill]
batch_size = 10
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert!((config.search.default_threshold - 0.4).abs() < 1e-6);
        assert!((config.search.vector_weight - 0.7).abs() < 1e-6);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Http);
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.backfill.batch_size, 10);
        assert_eq!(config.backfill.concurrency, 5);
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.search.default_max_results, 10);
    }
}
