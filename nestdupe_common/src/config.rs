use crate::{ChannelSwap, DedupError, DigestAlgorithm};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "nestdupe.toml";

/// Engine configuration for one deduplication run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default)]
    pub digest: DigestConfig,

    #[serde(default)]
    pub image: ImageHashConfig,
}

impl DedupConfig {
    pub fn validate(&self) -> Result<(), DedupError> {
        self.digest.validate()?;
        self.image.validate()
    }
}

/// Content digest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Digest algorithm name ("blake3" or "sha256")
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Ascending byte offsets at which partial digests are compared
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<u64>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            thresholds: default_thresholds(),
        }
    }
}

impl DigestConfig {
    pub fn algorithm(&self) -> Result<DigestAlgorithm, DedupError> {
        self.algorithm.parse()
    }

    pub fn validate(&self) -> Result<(), DedupError> {
        self.algorithm()?;
        if self.thresholds.is_empty() {
            return Err(DedupError::Config("digest thresholds must not be empty".to_string()));
        }
        if self.thresholds[0] == 0 {
            return Err(DedupError::Config("digest thresholds must be positive".to_string()));
        }
        if self.thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(DedupError::Config(
                "digest thresholds must be strictly ascending".to_string(),
            ));
        }
        Ok(())
    }
}

/// Perceptual image fingerprint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageHashConfig {
    /// Normalization edge length in pixels; 0 keeps the original size
    #[serde(default = "default_image_size")]
    pub size: u32,

    /// Convert to grayscale before fingerprinting
    #[serde(default)]
    pub gray: bool,

    /// Largest tolerated per-element difference, as a fraction of 255;
    /// 0 selects exact fingerprints
    #[serde(default)]
    pub color_threshold: f32,

    /// Largest tolerated fraction of differing elements
    #[serde(default)]
    pub count_threshold: f32,

    #[serde(default)]
    pub channel_swap: ChannelSwap,
}

impl Default for ImageHashConfig {
    fn default() -> Self {
        Self {
            size: default_image_size(),
            gray: false,
            color_threshold: 0.0,
            count_threshold: 0.0,
            channel_swap: ChannelSwap::default(),
        }
    }
}

impl ImageHashConfig {
    pub fn validate(&self) -> Result<(), DedupError> {
        for (name, value) in [
            ("color_threshold", self.color_threshold),
            ("count_threshold", self.count_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DedupError::Config(format!(
                    "{} must be within 0.0..=1.0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn default_algorithm() -> String {
    DigestAlgorithm::default().as_str().to_string()
}

/// Powers of four from 1 KiB up to 1 TiB.
pub fn default_thresholds() -> Vec<u64> {
    (0..16).map(|i| 1024u64 << (2 * i)).collect()
}

fn default_image_size() -> u32 {
    16
}

pub fn load_config(path: &Path) -> Result<DedupConfig, DedupError> {
    let config: DedupConfig = if path.exists() {
        let data = fs::read_to_string(path)?;
        toml::from_str(&data).map_err(|e| DedupError::Serialization(e.to_string()))?
    } else {
        DedupConfig::default()
    };
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &DedupConfig) -> Result<(), DedupError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data =
        toml::to_string_pretty(config).map_err(|e| DedupError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

pub fn default_config_path() -> Result<PathBuf, DedupError> {
    let dirs = ProjectDirs::from("", "nestdupe", "nestdupe")
        .ok_or_else(|| DedupError::Config("Unable to determine config directory".to_string()))?;
    Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_thresholds() {
        let thresholds = default_thresholds();
        assert_eq!(thresholds.first(), Some(&1024));
        assert_eq!(thresholds.last(), Some(&(1u64 << 40)));
        assert!(DigestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut digest = DigestConfig::default();
        digest.algorithm = "crc32".to_string();
        assert!(matches!(
            digest.validate(),
            Err(DedupError::UnsupportedDigestAlgorithm(_))
        ));

        let digest = DigestConfig {
            thresholds: vec![10, 10],
            ..DigestConfig::default()
        };
        assert!(matches!(digest.validate(), Err(DedupError::Config(_))));

        let image = ImageHashConfig {
            count_threshold: 1.5,
            ..ImageHashConfig::default()
        };
        assert!(image.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conf").join(CONFIG_FILE_NAME);

        let mut config = DedupConfig::default();
        config.digest.algorithm = "sha256".to_string();
        config.image.gray = true;
        config.image.color_threshold = 0.05;
        config.image.channel_swap = ChannelSwap::Gbr;

        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[image]\nsize = 32\n").unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.image.size, 32);
        assert_eq!(loaded.digest, DigestConfig::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let loaded = load_config(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, DedupConfig::default());
    }
}
