//! Storage module for the progress document and backup snapshots.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{Config, StagedFile};
use crate::progress::Progress;

pub const BACKUP_VERSION: u32 = 1;

/// Handles progress persistence.
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {:?}", parent))?;
        }
        Ok(Self { path })
    }

    /// Get default storage location.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ireader")
            .join("progress.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the progress document, or an empty one on first run.
    pub fn load(&self) -> Result<Progress> {
        if !self.path.exists() {
            debug!("no progress file at {:?}, starting fresh", self.path);
            return Ok(Progress::default());
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read progress file: {:?}", self.path))?;
        let progress = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse progress file: {:?}", self.path))?;
        Ok(progress)
    }

    /// Replace the whole document on disk.
    pub fn save(&self, progress: &Progress) -> Result<()> {
        self.stage(progress)?.commit()
    }

    fn stage(&self, progress: &Progress) -> Result<StagedFile> {
        let json = serde_json::to_string_pretty(progress)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write progress file: {:?}", tmp))?;
        Ok(StagedFile::new(tmp, self.path.clone()))
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Backup
// ══════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("backup is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported backup version {0}")]
    UnsupportedVersion(u32),

    #[error("word bank entry {0} has an empty term or id")]
    EmptyWord(usize),

    #[error("word bank contains {0:?} twice")]
    DuplicateWord(String),

    #[error("tag {tag:?} has more wrong answers ({wrong}) than views ({seen})")]
    InconsistentTag { tag: String, seen: u32, wrong: u32 },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// A full snapshot of local state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub version: u32,
    pub created_at: DateTime<Local>,
    pub settings: Config,
    pub progress: Progress,
}

impl Backup {
    pub fn new(settings: &Config, progress: &Progress) -> Self {
        Self {
            version: BACKUP_VERSION,
            created_at: Local::now(),
            settings: settings.clone(),
            progress: progress.clone(),
        }
    }

    /// Parse and check a snapshot without touching any local state.
    pub fn parse(json: &str) -> Result<Self, BackupError> {
        let backup: Backup = serde_json::from_str(json)?;
        backup.validate()?;
        Ok(backup)
    }

    pub fn validate(&self) -> Result<(), BackupError> {
        if self.version != BACKUP_VERSION {
            return Err(BackupError::UnsupportedVersion(self.version));
        }
        if let Some(problem) = self.settings.range_error() {
            return Err(BackupError::InvalidSettings(problem));
        }

        let mut ids = HashSet::new();
        for (i, entry) in self.progress.word_bank.iter().enumerate() {
            if entry.id.trim().is_empty() || entry.term.trim().is_empty() {
                return Err(BackupError::EmptyWord(i));
            }
            if !ids.insert(entry.id.as_str()) {
                return Err(BackupError::DuplicateWord(entry.id.clone()));
            }
        }

        for (tag, stat) in self.progress.tag_stats.values().flatten() {
            if stat.wrong > stat.seen {
                return Err(BackupError::InconsistentTag {
                    tag: tag.clone(),
                    seen: stat.seen,
                    wrong: stat.wrong,
                });
            }
        }
        Ok(())
    }
}

impl ProgressStore {
    /// Write a snapshot of settings and progress to `path`.
    pub fn export_backup(&self, path: &Path, settings: &Config, progress: &Progress) -> Result<usize> {
        let backup = Backup::new(settings, progress);
        let json = serde_json::to_string_pretty(&backup)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write backup: {:?}", path))?;

        info!("exported backup to {:?}", path);
        Ok(backup.progress.word_bank.len())
    }

    /// Read and validate a snapshot. Nothing is applied until it fully checks out.
    pub fn read_backup(path: &Path) -> Result<Backup> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read backup: {:?}", path))?;
        let backup = Backup::parse(&json)
            .with_context(|| format!("Rejected backup: {:?}", path))?;
        Ok(backup)
    }

    /// Replace local progress and the settings file at `config_path` with the
    /// snapshot at `path`, returning it. Both files are written beside their
    /// targets first; neither is replaced unless both writes succeed.
    pub fn import_backup(&self, path: &Path, config_path: &Path) -> Result<Backup> {
        let backup = Self::read_backup(path)?;

        let settings = backup.settings.stage(config_path)?;
        let progress = match self.stage(&backup.progress) {
            Ok(staged) => staged,
            Err(e) => {
                settings.discard();
                return Err(e);
            }
        };
        if let Err(e) = progress.commit() {
            settings.discard();
            return Err(e);
        }
        settings.commit()?;

        info!(
            "imported backup from {:?}: {} words",
            path,
            backup.progress.word_bank.len()
        );
        Ok(backup)
    }

    /// Get default backup path.
    pub fn default_backup_path() -> PathBuf {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(format!("ireader_backup_{}.json", timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::LookupResult;
    use crate::models::{Subject, TagStat};
    use crate::quiz::Outcome;
    use tempfile::TempDir;

    fn sample_progress() -> Progress {
        let mut progress = Progress::default();
        let now = Local::now();
        progress.add_word("kilometre", "千米", Some(Subject::Math), None, now);
        progress.add_word("food chain", "食物链", Some(Subject::Science), None, now);
        progress.record_outcome(
            Subject::Math,
            &Outcome {
                tags: vec!["area".into(), "units".into()],
                correct: false,
            },
            now,
        );
        progress.lookup_cache.insert(LookupResult::empty("kilometre"));
        progress
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("data").join("progress.json")).unwrap();
        assert_eq!(store.load().unwrap(), Progress::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json")).unwrap();
        let progress = sample_progress();
        store.save(&progress).unwrap();
        assert_eq!(store.load().unwrap(), progress);
        assert!(!dir.path().join("progress.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_store_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "[1, 2").unwrap();
        let store = ProgressStore::new(path).unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_backup_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json")).unwrap();
        let progress = sample_progress();
        let settings = Config {
            show_chinese: false,
            ..Config::default()
        };

        let backup_path = dir.path().join("backup.json");
        assert_eq!(store.export_backup(&backup_path, &settings, &progress).unwrap(), 2);

        store.save(&Progress::default()).unwrap();
        let config_path = dir.path().join("config.toml");
        let backup = store.import_backup(&backup_path, &config_path).unwrap();
        assert_eq!(backup.settings, settings);
        assert_eq!(Config::load_from(&config_path).unwrap(), settings);

        let restored = store.load().unwrap();
        assert_eq!(restored.word_bank, progress.word_bank);
        assert_eq!(restored.tag_stats, progress.tag_stats);
        assert_eq!(restored.lookup_cache, progress.lookup_cache);
    }

    #[test]
    fn test_malformed_backup_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json")).unwrap();
        let progress = sample_progress();
        store.save(&progress).unwrap();

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"{"version": 1, "settings": {}, "progress": {"word_bank": [}"#).unwrap();
        assert!(store.import_backup(&bad, &dir.path().join("config.toml")).is_err());
        assert_eq!(store.load().unwrap(), progress);
        assert!(!dir.path().join("config.toml").exists());
    }

    #[test]
    fn test_unwritable_settings_leave_progress_alone() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json")).unwrap();
        let backup_path = dir.path().join("backup.json");
        store
            .export_backup(&backup_path, &Config::default(), &sample_progress())
            .unwrap();
        store.save(&Progress::default()).unwrap();

        // The config directory is a regular file, so staging settings fails.
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let config_path = blocker.join("config.toml");

        assert!(store.import_backup(&backup_path, &config_path).is_err());
        assert_eq!(store.load().unwrap(), Progress::default());
        assert!(!dir.path().join("progress.json.tmp").exists());
    }

    #[test]
    fn test_backup_with_huge_cache_ttl_is_rejected() {
        let mut settings = Config::default();
        settings.cache_ttl_days = i64::MAX;
        let json = serde_json::to_string(&Backup::new(&settings, &sample_progress())).unwrap();
        assert!(matches!(Backup::parse(&json), Err(BackupError::InvalidSettings(_))));

        settings.cache_ttl_days = 14;
        settings.quiz_size = 0;
        let json = serde_json::to_string(&Backup::new(&settings, &sample_progress())).unwrap();
        assert!(matches!(Backup::parse(&json), Err(BackupError::InvalidSettings(_))));
    }

    #[test]
    fn test_backup_validation() {
        let progress = sample_progress();
        let mut backup = Backup::new(&Config::default(), &progress);
        assert!(backup.validate().is_ok());

        backup.version = 9;
        assert!(matches!(backup.validate(), Err(BackupError::UnsupportedVersion(9))));
        backup.version = BACKUP_VERSION;

        let first = backup.progress.word_bank[0].clone();
        backup.progress.word_bank.push(first);
        assert!(matches!(backup.validate(), Err(BackupError::DuplicateWord(_))));
        backup.progress.word_bank.pop();

        backup
            .progress
            .tag_stats
            .entry(Subject::Science)
            .or_default()
            .insert("magnets".into(), TagStat { seen: 1, wrong: 2, last_seen: None });
        assert!(matches!(backup.validate(), Err(BackupError::InconsistentTag { .. })));
    }

    #[test]
    fn test_parse_rejects_missing_sections() {
        let result = Backup::parse(r#"{"version": 1, "word_bank": []}"#);
        assert!(matches!(result, Err(BackupError::Parse(_))));
    }
}
