//! Data models for subjects, instruction cards, words and learner progress.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A school subject with its own card, word and pattern files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Math,
    Science,
    English,
    SocialStudies,
    Chinese,
}

impl Subject {
    pub fn all() -> &'static [Subject] {
        &[
            Subject::Math,
            Subject::Science,
            Subject::English,
            Subject::SocialStudies,
            Subject::Chinese,
        ]
    }

    /// Directory / storage key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::Science => "science",
            Self::English => "english",
            Self::SocialStudies => "social_studies",
            Self::Chinese => "chinese",
        }
    }

    pub fn name_en(&self) -> &'static str {
        match self {
            Self::Math => "Math",
            Self::Science => "Science",
            Self::English => "English",
            Self::SocialStudies => "Social Studies",
            Self::Chinese => "Chinese",
        }
    }

    pub fn name_zh(&self) -> &'static str {
        match self {
            Self::Math => "数学",
            Self::Science => "科学",
            Self::English => "英语",
            Self::SocialStudies => "社会研究",
            Self::Chinese => "华文",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase().replace('-', "_");
        Self::all().iter().copied().find(|s| s.key() == key)
    }
}

/// An English/Chinese example sentence pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleSentence {
    #[serde(default)]
    pub en: String,
    #[serde(default)]
    pub zh: String,
}

/// A dictionary entry from a subject's word list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Canonical lemma.
    pub term: String,
    #[serde(default)]
    pub pos: String,
    #[serde(default)]
    pub zh: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub examples: Vec<ExampleSentence>,
    #[serde(default)]
    pub collocations: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl WordEntry {
    #[cfg(test)]
    pub fn new(term: &str, zh: &str) -> Self {
        Self {
            id: None,
            term: term.to_string(),
            pos: String::new(),
            zh: zh.to_string(),
            hint: String::new(),
            examples: Vec::new(),
            collocations: Vec::new(),
            synonyms: Vec::new(),
        }
    }
}

/// Expected answers for the three quiz fields of a card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerKey {
    #[serde(default)]
    pub task: Vec<String>,
    #[serde(default)]
    pub notice: Vec<String>,
    #[serde(default)]
    pub output: String,
}

impl AnswerKey {
    /// The single-select output must be set. An empty task or notice set is a
    /// valid target: the learner scores it by selecting nothing.
    pub fn is_complete(&self) -> bool {
        !self.output.trim().is_empty()
    }
}

/// A comprehension exercise shown in read and quiz modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub en: String,
    #[serde(default)]
    pub zh: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<AnswerKey>,
}

impl InstructionCard {
    #[cfg(test)]
    pub fn new(en: &str, zh: &str) -> Self {
        Self {
            id: None,
            en: en.to_string(),
            zh: zh.to_string(),
            topic: String::new(),
            tags: Vec::new(),
            quiz: None,
        }
    }

    pub fn answer_key(&self) -> Option<&AnswerKey> {
        self.quiz.as_ref().filter(|k| k.is_complete())
    }
}

/// Bilingual label for a pattern key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub en: String,
    #[serde(default)]
    pub zh: String,
}

/// Vocabulary of valid quiz answers for a subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternBank {
    #[serde(default)]
    pub task_types: Vec<String>,
    #[serde(default)]
    pub notices: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, Label>,
}

impl PatternBank {
    /// Display text for a pattern key, falling back to the key itself.
    pub fn label(&self, key: &str, show_chinese: bool) -> String {
        match self.labels.get(key) {
            Some(label) if show_chinese && !label.zh.is_empty() => {
                if label.en.is_empty() {
                    label.zh.clone()
                } else {
                    format!("{} / {}", label.en, label.zh)
                }
            }
            Some(label) if !label.en.is_empty() => label.en.clone(),
            _ => key.to_string(),
        }
    }
}

/// Per-tag quiz history for one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagStat {
    pub seen: u32,
    pub wrong: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Local>>,
}

impl TagStat {
    pub fn wrong_rate(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            f64::from(self.wrong) / f64::from(self.seen)
        }
    }

    /// Count one quiz appearance.
    pub fn record(&mut self, correct: bool, at: DateTime<Local>) {
        self.seen = self.seen.saturating_add(1);
        if !correct {
            self.wrong = self.wrong.saturating_add(1);
        }
        // Imported documents may carry wrong > seen.
        self.wrong = self.wrong.min(self.seen);
        self.last_seen = Some(at);
    }
}

/// Tag statistics for one subject, keyed by tag.
pub type TagStats = BTreeMap<String, TagStat>;

/// A saved word in the learner's personal word bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBankEntry {
    pub id: String,
    pub term: String,
    #[serde(default)]
    pub zh: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    pub added_at: DateTime<Local>,
    /// Times the word was added or re-added.
    #[serde(default = "default_seen")]
    pub seen: u32,
    /// Reserved for spaced repetition; not computed yet.
    #[serde(default)]
    pub mastery: f32,
}

fn default_seen() -> u32 {
    1
}

/// Derive the word-bank key: an explicit id wins, otherwise the normalized lemma.
pub fn word_key(explicit_id: Option<&str>, term: &str) -> String {
    match explicit_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => normalize_term(term),
    }
}

pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}
