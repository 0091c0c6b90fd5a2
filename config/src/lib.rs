//! The collaborator interface the artifact cache core requires from its
//! host: a filesystem root it owns exclusively, a materialization policy,
//! a hash algorithm, and a storage quota.

mod error;

use std::path::{Path, PathBuf};

use hashing::HashAlgorithm;
use serde::{Deserialize, Serialize};

pub use error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub algorithm: HashAlgorithm,
    pub require_directories: bool,
    pub require_files: bool,
    pub quota_bytes: u64,
}

impl Default for CacheConfig {
    /// Conservative defaults: a full local hit requires every file blob to
    /// be present, matching the distilled spec's framing of `require_files
    /// = false` as a relaxation a caller opts into rather than the norm.
    fn default() -> CacheConfig {
        CacheConfig {
            root: PathBuf::from("."),
            algorithm: HashAlgorithm::Sha256,
            require_directories: true,
            require_files: true,
            quota_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(text: &str) -> Result<CacheConfig, Error> {
        let config: CacheConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<CacheConfig, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.quota_bytes == 0 {
            return Err(Error::Invalid("quota_bytes must be greater than zero".to_string()));
        }
        if self.root.as_os_str().is_empty() {
            return Err(Error::Invalid("root must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = CacheConfig::default();
        assert!(config.require_directories);
        assert!(config.require_files);
    }

    #[test]
    fn parses_a_minimal_document() {
        let config = CacheConfig::from_toml_str(
            r#"
            root = "/var/cache/buildstream"
            quota_bytes = 1073741824
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/var/cache/buildstream"));
        assert_eq!(config.quota_bytes, 1073741824);
        assert!(config.require_files);
    }

    #[test]
    fn rejects_zero_quota() {
        let err = CacheConfig::from_toml_str(r#"quota_bytes = 0"#).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }
}
