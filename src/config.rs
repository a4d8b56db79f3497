use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::BackupError;

/// On-disk config: catalog endpoint and API key, loaded once per
/// scheduling period rather than per invocation.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub catalog_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub catalog_url: String,
    pub api_key: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, BackupError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("ckan-backup.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(BackupError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BackupError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BackupError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, BackupError> {
        let catalog_url = config.catalog_url.trim().trim_end_matches('/').to_string();
        if !catalog_url.starts_with("http://") && !catalog_url.starts_with("https://") {
            return Err(BackupError::InvalidEndpoint(config.catalog_url));
        }
        let api_key = config.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(BackupError::ConfigParse(
                "api_key must not be empty".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            catalog_url,
            api_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn resolve_config_valid() {
        let config = Config {
            schema_version: None,
            catalog_url: "https://catalog.example.org/".to_string(),
            api_key: "secret".to_string(),
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.catalog_url, "https://catalog.example.org");
        assert_eq!(resolved.api_key, "secret");
    }

    #[test]
    fn resolve_config_rejects_non_http_url() {
        let config = Config {
            schema_version: None,
            catalog_url: "catalog.example.org".to_string(),
            api_key: "secret".to_string(),
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, BackupError::InvalidEndpoint(_));
    }

    #[test]
    fn resolve_config_rejects_empty_api_key() {
        let config = Config {
            schema_version: None,
            catalog_url: "https://catalog.example.org".to_string(),
            api_key: "  ".to_string(),
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, BackupError::ConfigParse(_));
    }
}
