//! Settings persistence for the reader.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_QUIZ_SIZE: usize = 50;
pub const MAX_CACHE_TTL_DAYS: i64 = 365;

/// Learner settings that persist between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// The currently selected theme name.
    #[serde(default = "default_theme")]
    pub theme: String,

    /// Show Chinese translations under English text.
    #[serde(default = "default_true")]
    pub show_chinese: bool,

    /// Cards per quiz session.
    #[serde(default = "default_quiz_size")]
    pub quiz_size: usize,

    /// Query online dictionaries for words not in the cache.
    #[serde(default = "default_true")]
    pub online_lookup: bool,

    /// How long a cached lookup stays fresh.
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: i64,
}

fn default_theme() -> String {
    "eye-care".to_string()
}

fn default_true() -> bool {
    true
}

fn default_quiz_size() -> usize {
    10
}

fn default_cache_ttl_days() -> i64 {
    14
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            show_chinese: true,
            quiz_size: default_quiz_size(),
            online_lookup: true,
            cache_ttl_days: default_cache_ttl_days(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ireader")
            .join("config.toml")
    }

    /// Load config from disk, returning default if file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| "Failed to parse config file")?;
        config.clamp_ranges();

        Ok(config)
    }

    /// Pull numeric settings back into their editable ranges.
    pub fn clamp_ranges(&mut self) {
        self.quiz_size = self.quiz_size.clamp(1, MAX_QUIZ_SIZE);
        self.cache_ttl_days = self.cache_ttl_days.clamp(0, MAX_CACHE_TTL_DAYS);
    }

    /// Describe the first numeric setting outside its range, if any.
    pub fn range_error(&self) -> Option<String> {
        if !(1..=MAX_QUIZ_SIZE).contains(&self.quiz_size) {
            return Some(format!("quiz_size {} is not in 1..={}", self.quiz_size, MAX_QUIZ_SIZE));
        }
        if !(0..=MAX_CACHE_TTL_DAYS).contains(&self.cache_ttl_days) {
            return Some(format!(
                "cache_ttl_days {} is not in 0..={}",
                self.cache_ttl_days, MAX_CACHE_TTL_DAYS
            ));
        }
        None
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let staged = self.stage(path)?;
        staged.commit()
    }

    /// Write the config next to `path` without replacing it yet.
    pub fn stage(&self, path: &Path) -> Result<StagedFile> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config")?;

        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write config file: {:?}", tmp))?;

        Ok(StagedFile {
            tmp,
            target: path.to_path_buf(),
        })
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache_ttl_days.clamp(0, MAX_CACHE_TTL_DAYS))
    }
}

/// A file written beside its target, waiting to be renamed into place.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    pub fn new(tmp: PathBuf, target: PathBuf) -> Self {
        Self { tmp, target }
    }

    pub fn commit(self) -> Result<()> {
        fs::rename(&self.tmp, &self.target)
            .with_context(|| format!("Failed to replace {:?}", self.target))
    }

    /// Remove the staged copy, leaving the target untouched.
    pub fn discard(self) {
        let _ = fs::remove_file(&self.tmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "theme = \"dark\"\nquiz_size = 5\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.theme, "dark");
        assert_eq!(config.quiz_size, 5);
        assert!(config.show_chinese);
        assert_eq!(config.cache_ttl_days, 14);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            show_chinese: false,
            online_lookup: false,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "quiz_size = 0\ncache_ttl_days = 9223372036854775807\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.quiz_size, 1);
        assert_eq!(config.cache_ttl_days, MAX_CACHE_TTL_DAYS);
        assert_eq!(config.cache_ttl(), chrono::Duration::days(MAX_CACHE_TTL_DAYS));
        assert!(config.range_error().is_none());
    }

    #[test]
    fn test_cache_ttl_never_panics() {
        let config = Config {
            cache_ttl_days: i64::MAX,
            ..Config::default()
        };
        assert_eq!(config.cache_ttl(), chrono::Duration::days(MAX_CACHE_TTL_DAYS));
        assert!(config.range_error().is_some());

        let config = Config {
            cache_ttl_days: i64::MIN,
            ..Config::default()
        };
        assert_eq!(config.cache_ttl(), chrono::Duration::zero());
    }

    #[test]
    fn test_stage_leaves_target_until_commit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        Config::default().save_to(&path).unwrap();

        let changed = Config {
            quiz_size: 7,
            ..Config::default()
        };
        let staged = changed.stage(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
        staged.commit().unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), changed);
        assert!(!dir.path().join("config.toml.tmp").exists());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "quiz_size = \"many\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
