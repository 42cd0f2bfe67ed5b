use std::path::Path;

use serde::{Deserialize, Serialize};

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_STORAGE_ROOT: &str = "./static";
const DEFAULT_MODEL_CACHE: &str = "./models";

/// Default text model for the OCR-aligned embedding space
const DEFAULT_OCR_MODEL: &str = "bge-base-en-v1.5";

/// Configuration for OCR-based search capabilities
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OcrSearchConfig {
    /// Enable OCR and combined search bases
    #[serde(default)]
    pub enabled: bool,
}

/// Configuration for the local image storage backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Enable local storage of uploaded originals
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,

    /// Directory holding the stored originals, thumbnails and the
    /// `_deleted` recovery area
    #[serde(default = "default_storage_root")]
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_storage_enabled(),
            root: default_storage_root(),
        }
    }
}

fn default_storage_enabled() -> bool {
    true
}

fn default_storage_root() -> String {
    DEFAULT_STORAGE_ROOT.to_string()
}

/// Bearer tokens guarding the HTTP surface.
///
/// An unset token leaves the corresponding endpoint group public.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token required by the search endpoints
    #[serde(default)]
    pub access_token: Option<String>,

    /// Token required by the upload and moderation endpoints
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Configuration for the embedding models
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Directory to cache downloaded models
    #[serde(default = "default_model_cache")]
    pub cache_dir: String,

    /// Text model for the OCR-aligned space (e.g. "bge-base-en-v1.5")
    #[serde(default = "default_ocr_model")]
    pub ocr_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_model_cache(),
            ocr_model: default_ocr_model(),
        }
    }
}

fn default_model_cache() -> String {
    DEFAULT_MODEL_CACHE.to_string()
}

fn default_ocr_model() -> String {
    DEFAULT_OCR_MODEL.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub ocr_search: OcrSearchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            ocr_search: OcrSearchConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl Config {
    fn validate(&self) {
        if self.bind.parse::<std::net::SocketAddr>().is_err() {
            panic!("bind must be a socket address, got '{}'", self.bind);
        }

        if self.storage.enabled && self.storage.root.trim().is_empty() {
            panic!("storage.root must not be empty while storage is enabled");
        }

        if self.embedding.ocr_model.trim().is_empty() {
            panic!("embedding.ocr_model must not be empty");
        }

        for (name, token) in [
            ("auth.access_token", &self.auth.access_token),
            ("auth.admin_token", &self.auth.admin_token),
        ] {
            if let Some(token) = token {
                if token.trim().is_empty() {
                    panic!("{name} must not be blank; omit it to leave the endpoints public");
                }
            }
        }
    }

    /// Load the config file from `path`, creating it with defaults first if
    /// it does not exist yet.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            let rendered =
                serde_yml::to_string(&Self::default()).expect("default config serializes");
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).expect("config directory is writable");
                }
            }
            std::fs::write(path, rendered).expect("config file is writable");
            log::info!("wrote default config to {}", path.display());
        }

        let config_str = std::fs::read_to_string(path).expect("config file is readable");
        let config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.validate();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind, DEFAULT_BIND);
        assert!(!config.ocr_search.enabled);
        assert!(config.storage.enabled);
        assert_eq!(config.storage.root, DEFAULT_STORAGE_ROOT);
        assert!(config.auth.access_token.is_none());
        assert!(config.auth.admin_token.is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: Config = serde_yml::from_str("ocr_search:\n  enabled: true\n").unwrap();
        assert!(config.ocr_search.enabled);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.embedding.ocr_model, DEFAULT_OCR_MODEL);
    }

    #[test]
    #[should_panic(expected = "bind must be a socket address")]
    fn test_validate_rejects_bad_bind() {
        let config = Config {
            bind: "not-an-addr".to_string(),
            ..Config::default()
        };
        config.validate();
    }

    #[test]
    #[should_panic(expected = "must not be blank")]
    fn test_validate_rejects_blank_token() {
        let config = Config {
            auth: AuthConfig {
                access_token: Some("   ".to_string()),
                admin_token: None,
            },
            ..Config::default()
        };
        config.validate();
    }
}
