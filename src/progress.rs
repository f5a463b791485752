//! The learner's progress document: word bank, tag statistics and lookup cache.
//!
//! The whole document is loaded once, mutated in memory by the app and
//! written back wholesale.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::annotate::{annotate, PhraseIndex};
use crate::dataset::SubjectData;
use crate::dictionary::LookupCache;
use crate::models::{word_key, Subject, TagStats, WordBankEntry};
use crate::quiz::Outcome;

/// Most entries kept in the word bank.
pub const WORD_BANK_LIMIT: usize = 2000;
/// Most words taken from one card by "add all words".
pub const ADD_ALL_LIMIT: usize = 30;

static NO_STATS: TagStats = BTreeMap::new();

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Newest first.
    #[serde(default)]
    pub word_bank: Vec<WordBankEntry>,
    #[serde(default)]
    pub tag_stats: BTreeMap<Subject, TagStats>,
    #[serde(default)]
    pub lookup_cache: LookupCache,
}

impl Progress {
    // ══════════════════════════════════════════════════════════════════════
    // Word Bank
    // ══════════════════════════════════════════════════════════════════════

    /// Add a word, or bump it if already saved. Returns true for a new entry.
    pub fn add_word(
        &mut self,
        term: &str,
        zh: &str,
        subject: Option<Subject>,
        explicit_id: Option<&str>,
        now: DateTime<Local>,
    ) -> bool {
        let term = term.trim();
        if term.is_empty() {
            return false;
        }

        let id = word_key(explicit_id, term);
        if let Some(entry) = self.word_bank.iter_mut().find(|e| e.id == id) {
            if entry.zh.is_empty() {
                entry.zh = zh.to_string();
            }
            if entry.subject.is_none() {
                entry.subject = subject;
            }
            entry.seen = entry.seen.saturating_add(1);
            return false;
        }

        self.word_bank.insert(
            0,
            WordBankEntry {
                id,
                term: term.to_string(),
                zh: zh.to_string(),
                subject,
                added_at: now,
                seen: 1,
                mastery: 0.0,
            },
        );
        self.word_bank.truncate(WORD_BANK_LIMIT);
        true
    }

    /// Add the first words of `text`, with translations from the subject word list.
    pub fn add_words_from_text(
        &mut self,
        text: &str,
        data: &SubjectData,
        now: DateTime<Local>,
    ) -> usize {
        let annotation = annotate(text, &PhraseIndex::default());
        let words: Vec<&str> = annotation.units().map(|s| s.text).take(ADD_ALL_LIMIT).collect();

        let mut added = 0;
        for word in words {
            let zh = data.lookup_word(word).map(|w| w.zh.as_str()).unwrap_or("");
            if self.add_word(word, zh, Some(data.subject), None, now) {
                added += 1;
            }
        }
        debug!("added {} new words from card text", added);
        added
    }

    pub fn remove_word(&mut self, id: &str) -> bool {
        let before = self.word_bank.len();
        self.word_bank.retain(|e| e.id != id);
        self.word_bank.len() != before
    }

    pub fn clear_word_bank(&mut self) {
        self.word_bank.clear();
    }

    /// Entries whose term (case-insensitive) or translation contains `query`.
    pub fn search_word_bank(&self, query: &str) -> Vec<&WordBankEntry> {
        let query = query.trim().to_lowercase();
        self.word_bank
            .iter()
            .filter(|e| {
                query.is_empty() || e.term.to_lowercase().contains(&query) || e.zh.contains(&query)
            })
            .collect()
    }

    // ══════════════════════════════════════════════════════════════════════
    // Tag Statistics
    // ══════════════════════════════════════════════════════════════════════

    pub fn stats(&self, subject: Subject) -> &TagStats {
        self.tag_stats.get(&subject).unwrap_or(&NO_STATS)
    }

    /// Count a finished or skipped quiz card against each of its tags.
    pub fn record_outcome(&mut self, subject: Subject, outcome: &Outcome, now: DateTime<Local>) {
        let stats = self.tag_stats.entry(subject).or_default();
        for tag in &outcome.tags {
            stats.entry(tag.clone()).or_default().record(outcome.correct, now);
        }
    }

    /// Fix up counters that break `wrong <= seen`. Returns the number of fixes.
    pub fn normalize_stats(&mut self) -> usize {
        let mut fixed = 0;
        for stat in self.tag_stats.values_mut().flat_map(|s| s.values_mut()) {
            if stat.wrong > stat.seen {
                stat.wrong = stat.seen;
                fixed += 1;
            }
        }
        fixed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatternBank, WordEntry};

    fn outcome(tags: &[&str], correct: bool) -> Outcome {
        Outcome {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            correct,
        }
    }

    #[test]
    fn test_add_word_dedupes_by_normalized_term() {
        let mut progress = Progress::default();
        let now = Local::now();
        assert!(progress.add_word("Kilometre", "", Some(Subject::Math), None, now));
        assert!(!progress.add_word(" kilometre ", "千米", None, None, now + chrono::Duration::hours(1)));

        assert_eq!(progress.word_bank.len(), 1);
        let entry = &progress.word_bank[0];
        assert_eq!(entry.id, "kilometre");
        assert_eq!(entry.term, "Kilometre");
        assert_eq!(entry.zh, "千米");
        assert_eq!(entry.seen, 2);
        assert_eq!(entry.added_at, now);
        assert_eq!(entry.subject, Some(Subject::Math));
    }

    #[test]
    fn test_add_word_keeps_existing_translation() {
        let mut progress = Progress::default();
        let now = Local::now();
        progress.add_word("area", "面积", None, None, now);
        progress.add_word("area", "区域", None, None, now);
        assert_eq!(progress.word_bank[0].zh, "面积");
    }

    #[test]
    fn test_word_bank_newest_first_and_capped() {
        let mut progress = Progress::default();
        let now = Local::now();
        for i in 0..WORD_BANK_LIMIT + 5 {
            progress.add_word(&format!("word{i}"), "", None, None, now);
        }
        assert_eq!(progress.word_bank.len(), WORD_BANK_LIMIT);
        assert_eq!(progress.word_bank[0].term, format!("word{}", WORD_BANK_LIMIT + 4));
    }

    #[test]
    fn test_explicit_id_wins() {
        let mut progress = Progress::default();
        let now = Local::now();
        progress.add_word("Area", "", None, Some("m-area"), now);
        progress.add_word("area", "", None, None, now);
        assert_eq!(progress.word_bank.len(), 2);
        assert!(progress.remove_word("m-area"));
        assert!(!progress.remove_word("m-area"));
        assert_eq!(progress.word_bank[0].id, "area");
    }

    #[test]
    fn test_search_and_clear() {
        let mut progress = Progress::default();
        let now = Local::now();
        progress.add_word("perimeter", "周长", None, None, now);
        progress.add_word("area", "面积", None, None, now);
        assert_eq!(progress.search_word_bank("PERI").len(), 1);
        assert_eq!(progress.search_word_bank("面积")[0].term, "area");
        assert_eq!(progress.search_word_bank("").len(), 2);
        progress.clear_word_bank();
        assert!(progress.word_bank.is_empty());
    }

    #[test]
    fn test_add_words_from_text() {
        let data = SubjectData::new(
            Subject::Math,
            Vec::new(),
            vec![WordEntry::new("area", "面积")],
            PatternBank::default(),
        );
        let mut progress = Progress::default();
        let added = progress.add_words_from_text("Find the area. Find it!", &data, Local::now());
        assert_eq!(added, 4);
        let area = progress.word_bank.iter().find(|e| e.id == "area").unwrap();
        assert_eq!(area.zh, "面积");
        let find = progress.word_bank.iter().find(|e| e.id == "find").unwrap();
        assert_eq!(find.seen, 2);
    }

    #[test]
    fn test_stats_monotonic_and_bounded() {
        let mut progress = Progress::default();
        let now = Local::now();
        let events = [
            (vec!["area", "units"], true),
            (vec!["area"], false),
            (vec!["units"], false),
            (vec!["area", "money"], true),
            (vec!["money"], false),
        ];

        let mut last_seen: BTreeMap<String, u32> = BTreeMap::new();
        for (tags, correct) in &events {
            progress.record_outcome(Subject::Math, &outcome(tags, *correct), now);
            for (tag, stat) in progress.stats(Subject::Math) {
                assert!(stat.wrong <= stat.seen);
                let previous = last_seen.insert(tag.clone(), stat.seen).unwrap_or(0);
                assert!(stat.seen >= previous);
            }
        }

        let stats = progress.stats(Subject::Math);
        assert_eq!(stats["area"].seen, 3);
        assert_eq!(stats["area"].wrong, 1);
        assert_eq!(stats["money"].wrong, 1);
        assert!(progress.stats(Subject::Science).is_empty());
    }

    #[test]
    fn test_normalize_stats() {
        let mut progress = Progress::default();
        let stats = progress.tag_stats.entry(Subject::Science).or_default();
        stats.insert(
            "magnets".into(),
            crate::models::TagStat {
                seen: 2,
                wrong: 5,
                last_seen: None,
            },
        );
        assert_eq!(progress.normalize_stats(), 1);
        assert_eq!(progress.stats(Subject::Science)["magnets"].wrong, 2);
    }
}
