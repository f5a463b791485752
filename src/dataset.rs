//! Per-subject instruction cards, word lists and pattern banks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::annotate::{PhraseIndex, MAX_PHRASES};
use crate::models::{InstructionCard, PatternBank, Subject, WordEntry};

const BUNDLED_MATH_INSTRUCTIONS: &str = include_str!("../bundled_data/math/instructions.json");
const BUNDLED_MATH_WORDS: &str = include_str!("../bundled_data/math/words.json");
const BUNDLED_MATH_PATTERNS: &str = include_str!("../bundled_data/math/patterns.json");
const BUNDLED_SCIENCE_INSTRUCTIONS: &str =
    include_str!("../bundled_data/science/instructions.json");
const BUNDLED_SCIENCE_WORDS: &str = include_str!("../bundled_data/science/words.json");
const BUNDLED_SCIENCE_PATTERNS: &str = include_str!("../bundled_data/science/patterns.json");

/// Most results returned by a word-list search.
const SEARCH_LIMIT: usize = 200;

/// Everything the app knows about one subject.
#[derive(Debug, Clone)]
pub struct SubjectData {
    pub subject: Subject,
    pub instructions: Vec<InstructionCard>,
    pub words: Vec<WordEntry>,
    pub patterns: PatternBank,
    pub phrase_index: PhraseIndex,
    word_index: HashMap<String, usize>,
}

impl SubjectData {
    pub fn new(
        subject: Subject,
        instructions: Vec<InstructionCard>,
        words: Vec<WordEntry>,
        patterns: PatternBank,
    ) -> Self {
        let mut word_index = HashMap::new();
        for (i, word) in words.iter().enumerate() {
            word_index.insert(word.term.trim().to_lowercase(), i);
        }
        let phrase_index = PhraseIndex::build(&words);
        if phrase_index.len() > MAX_PHRASES {
            warn!(
                "{} has {} phrases; only the longest {} are matched",
                subject.key(),
                phrase_index.len(),
                MAX_PHRASES
            );
        }

        let unquizzable = instructions
            .iter()
            .filter(|c| c.quiz.is_some() && c.answer_key().is_none())
            .count();
        if unquizzable > 0 {
            warn!(
                "{} has {} cards whose answer key has no output; left out of quizzes",
                subject.key(),
                unquizzable
            );
        }

        Self {
            subject,
            instructions,
            words,
            patterns,
            phrase_index,
            word_index,
        }
    }

    pub fn empty(subject: Subject) -> Self {
        Self::new(subject, Vec::new(), Vec::new(), PatternBank::default())
    }

    /// Resolve a clicked term against the word list, also trying without a trailing `'s`.
    pub fn lookup_word(&self, term: &str) -> Option<&WordEntry> {
        let key = term.trim().to_lowercase();
        self.word_index
            .get(&key)
            .or_else(|| key.strip_suffix("'s").and_then(|k| self.word_index.get(k)))
            .map(|&i| &self.words[i])
    }

    /// Case-insensitive substring search over lemma and translation.
    pub fn search_words(&self, query: &str) -> Vec<&WordEntry> {
        let query = query.trim().to_lowercase();
        self.words
            .iter()
            .filter(|w| {
                query.is_empty() || w.term.to_lowercase().contains(&query) || w.zh.contains(&query)
            })
            .take(SEARCH_LIMIT)
            .collect()
    }

    /// Cards that can be used in a quiz.
    pub fn quiz_pool(&self) -> Vec<&InstructionCard> {
        self.instructions
            .iter()
            .filter(|c| c.answer_key().is_some())
            .collect()
    }
}

/// Read-only provider of subject data.
pub trait SubjectSource {
    fn load(&self, subject: Subject) -> SubjectData;
}

/// Loads `<data_dir>/<subject>/*.json`, falling back to data bundled in the binary.
pub struct FileSource {
    data_dir: Option<PathBuf>,
}

impl FileSource {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self { data_dir }
    }

    fn bundled(subject: Subject) -> Option<(&'static str, &'static str, &'static str)> {
        match subject {
            Subject::Math => Some((
                BUNDLED_MATH_INSTRUCTIONS,
                BUNDLED_MATH_WORDS,
                BUNDLED_MATH_PATTERNS,
            )),
            Subject::Science => Some((
                BUNDLED_SCIENCE_INSTRUCTIONS,
                BUNDLED_SCIENCE_WORDS,
                BUNDLED_SCIENCE_PATTERNS,
            )),
            _ => None,
        }
    }
}

impl SubjectSource for FileSource {
    fn load(&self, subject: Subject) -> SubjectData {
        if let Some(dir) = &self.data_dir {
            let subject_dir = dir.join(subject.key());
            if subject_dir.is_dir() {
                debug!("loading {} from {:?}", subject.key(), subject_dir);
                return SubjectData::new(
                    subject,
                    read_list(&subject_dir.join("instructions.json")),
                    read_words(&subject_dir.join("words.json")),
                    read_patterns(&subject_dir.join("patterns.json")),
                );
            }
        }

        match Self::bundled(subject) {
            Some((instructions, words, patterns)) => {
                debug!("loading bundled data for {}", subject.key());
                SubjectData::new(
                    subject,
                    parse_list(instructions, "bundled instructions"),
                    clean_words(parse_list(words, "bundled words")),
                    parse_patterns(patterns, "bundled patterns"),
                )
            }
            None => {
                debug!("no data for {}", subject.key());
                SubjectData::empty(subject)
            }
        }
    }
}

/// Lazily loaded subject data, cached for the session.
pub struct DataLibrary {
    source: Box<dyn SubjectSource>,
    loaded: HashMap<Subject, SubjectData>,
}

impl DataLibrary {
    pub fn new(source: Box<dyn SubjectSource>) -> Self {
        Self {
            source,
            loaded: HashMap::new(),
        }
    }

    pub fn get(&mut self, subject: Subject) -> &SubjectData {
        let source = &self.source;
        self.loaded
            .entry(subject)
            .or_insert_with(|| source.load(subject))
    }

    /// Already-loaded data, without touching the source.
    pub fn cached(&self, subject: Subject) -> Option<&SubjectData> {
        self.loaded.get(&subject)
    }
}

fn read_file(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("skipping {:?}: {}", path, e);
            None
        }
    }
}

fn read_list<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    read_file(path)
        .map(|content| parse_list(&content, &path.display().to_string()))
        .unwrap_or_default()
}

fn read_words(path: &Path) -> Vec<WordEntry> {
    clean_words(read_list(path))
}

fn read_patterns(path: &Path) -> PatternBank {
    read_file(path)
        .map(|content| parse_patterns(&content, &path.display().to_string()))
        .unwrap_or_default()
}

/// Parse a JSON array, dropping entries that don't fit `T`.
fn parse_list<T: DeserializeOwned>(content: &str, origin: &str) -> Vec<T> {
    let values: Vec<serde_json::Value> = match serde_json::from_str(content) {
        Ok(values) => values,
        Err(e) => {
            warn!("malformed list in {}: {}", origin, e);
            return Vec::new();
        }
    };

    let total = values.len();
    let items: Vec<T> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if items.len() < total {
        warn!("dropped {} malformed entries from {}", total - items.len(), origin);
    }
    items
}

fn parse_patterns(content: &str, origin: &str) -> PatternBank {
    serde_json::from_str(content).unwrap_or_else(|e| {
        warn!("malformed pattern bank in {}: {}", origin, e);
        PatternBank::default()
    })
}

fn clean_words(words: Vec<WordEntry>) -> Vec<WordEntry> {
    words
        .into_iter()
        .filter(|w| !w.term.trim().is_empty())
        .collect()
}
