//! Dictionary lookups: online providers, the lookup cache and background dispatch.

use std::collections::{BTreeMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{normalize_term, ExampleSentence, WordEntry};

const ENTRY_URL: &str = "https://api.dictionaryapi.dev/api/v2/entries/en/";
const TRANSLATE_URL: &str = "https://api.mymemory.translated.net/get";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cannot build lookup URL for {0:?}")]
    InvalidTerm(String),

    #[error("no dictionary data for {0:?}")]
    NotFound(String),

    #[error("online lookup is disabled")]
    Offline,
}

/// Best-effort dictionary data for a term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    pub term: String,
    #[serde(default)]
    pub phonetic: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub zh: String,
    /// Pronunciation recording, UK/GB preferred.
    #[serde(default)]
    pub audio: String,
    pub fetched_at: DateTime<Local>,
}

impl LookupResult {
    pub fn empty(term: &str) -> Self {
        Self {
            term: term.trim().to_string(),
            phonetic: String::new(),
            definition: String::new(),
            zh: String::new(),
            audio: String::new(),
            fetched_at: Local::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.phonetic.is_empty() && self.definition.is_empty() && self.zh.is_empty()
    }
}

/// Something that can look a term up.
pub trait DictionaryProvider: Send + Sync {
    fn lookup(&self, term: &str) -> Result<LookupResult, LookupError>;
}

/// Never reaches the network.
pub struct OfflineDictionary;

impl DictionaryProvider for OfflineDictionary {
    fn lookup(&self, _term: &str) -> Result<LookupResult, LookupError> {
        Err(LookupError::Offline)
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Online Provider
// ══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
struct ApiEntry {
    #[serde(default)]
    phonetic: Option<String>,
    #[serde(default)]
    phonetics: Vec<ApiPhonetic>,
    #[serde(default)]
    meanings: Vec<ApiMeaning>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPhonetic {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    audio: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMeaning {
    #[serde(default)]
    definitions: Vec<ApiDefinition>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDefinition {
    #[serde(default)]
    definition: String,
}

#[derive(Debug, Deserialize)]
struct TranslationResponse {
    #[serde(rename = "responseData")]
    response_data: Option<TranslationData>,
}

#[derive(Debug, Deserialize)]
struct TranslationData {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
}

/// English entries from dictionaryapi.dev plus an en→zh translation from MyMemory.
pub struct OnlineDictionary {
    client: Client,
}

impl OnlineDictionary {
    pub fn new() -> Result<Self, LookupError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    fn fetch_entry(&self, term: &str) -> Result<Vec<ApiEntry>, LookupError> {
        let mut url =
            Url::parse(ENTRY_URL).map_err(|_| LookupError::InvalidTerm(term.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| LookupError::InvalidTerm(term.to_string()))?
            .pop_if_empty()
            .push(term);

        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(LookupError::NotFound(term.to_string()));
        }
        Ok(response.json()?)
    }

    fn fetch_translation(&self, term: &str) -> Result<String, LookupError> {
        let response: TranslationResponse = self
            .client
            .get(TRANSLATE_URL)
            .query(&[("q", term), ("langpair", "en|zh-CN")])
            .send()?
            .error_for_status()?
            .json()?;

        response
            .response_data
            .and_then(|d| d.translated_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LookupError::NotFound(term.to_string()))
    }
}

impl DictionaryProvider for OnlineDictionary {
    fn lookup(&self, term: &str) -> Result<LookupResult, LookupError> {
        let term = term.trim();
        let mut result = LookupResult::empty(term);

        let entry = self.fetch_entry(&normalize_term(term));
        let translation = self.fetch_translation(term);

        match (&entry, &translation) {
            (Err(e), Err(_)) => {
                debug!("lookup of {:?} failed on both providers", term);
                return Err(LookupError::NotFound(format!("{term}: {e}")));
            }
            (Err(e), _) => debug!("no English entry for {:?}: {}", term, e),
            (_, Err(e)) => debug!("no translation for {:?}: {}", term, e),
            _ => {}
        }

        if let Ok(entries) = entry {
            fill_from_entries(&mut result, &entries);
        }
        if let Ok(zh) = translation {
            result.zh = zh;
        }
        Ok(result)
    }
}

fn fill_from_entries(result: &mut LookupResult, entries: &[ApiEntry]) {
    let Some(first) = entries.first() else {
        return;
    };

    result.phonetic = first
        .phonetic
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| first.phonetics.iter().find_map(|p| p.text.clone()))
        .unwrap_or_default();

    let audios: Vec<&str> = first
        .phonetics
        .iter()
        .filter_map(|p| p.audio.as_deref())
        .filter(|a| !a.is_empty())
        .collect();
    result.audio = audios
        .iter()
        .find(|a| {
            let a = a.to_lowercase();
            a.contains("uk") || a.contains("gb")
        })
        .or_else(|| audios.first())
        .map(|a| a.to_string())
        .unwrap_or_default();

    result.definition = first
        .meanings
        .first()
        .and_then(|m| m.definitions.first())
        .map(|d| d.definition.clone())
        .unwrap_or_default();
}

// ══════════════════════════════════════════════════════════════════════════
// Cache
// ══════════════════════════════════════════════════════════════════════════

/// Lookup results keyed by normalized term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupCache {
    entries: BTreeMap<String, LookupResult>,
}

impl LookupCache {
    /// A cached result younger than `ttl`.
    pub fn get_fresh(
        &self,
        term: &str,
        ttl: chrono::Duration,
        now: DateTime<Local>,
    ) -> Option<&LookupResult> {
        self.entries
            .get(&normalize_term(term))
            .filter(|r| now.signed_duration_since(r.fetched_at) < ttl)
    }

    pub fn insert(&mut self, result: LookupResult) {
        self.entries.insert(normalize_term(&result.term), result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Background Dispatch
// ══════════════════════════════════════════════════════════════════════════

/// A finished lookup, delivered back to the event loop.
#[derive(Debug)]
pub struct LookupMessage {
    pub term: String,
    pub result: Result<LookupResult, LookupError>,
}

/// Runs lookups off the event loop and hands results back over a channel.
pub struct Lookups {
    provider: Arc<dyn DictionaryProvider>,
    tx: Sender<LookupMessage>,
    rx: Receiver<LookupMessage>,
    in_flight: HashSet<String>,
}

impl Lookups {
    pub fn new(provider: Arc<dyn DictionaryProvider>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            provider,
            tx,
            rx,
            in_flight: HashSet::new(),
        }
    }

    /// Start a lookup unless one for the same term is already running.
    pub fn request(&mut self, term: &str) {
        let key = normalize_term(term);
        if key.is_empty() || !self.in_flight.insert(key.clone()) {
            return;
        }

        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        let term = term.trim().to_string();
        thread::spawn(move || {
            let result = provider.lookup(&term);
            // The receiver only goes away when the app exits.
            let _ = tx.send(LookupMessage { term, result });
        });
    }

    /// Drain finished lookups without blocking.
    pub fn poll(&mut self) -> Vec<LookupMessage> {
        let messages: Vec<LookupMessage> = self.rx.try_iter().collect();
        for message in &messages {
            self.in_flight.remove(&normalize_term(&message.term));
            if let Err(e) = &message.result {
                warn!("lookup of {:?} failed: {}", message.term, e);
            }
        }
        messages
    }

    pub fn is_pending(&self, term: &str) -> bool {
        self.in_flight.contains(&normalize_term(term))
    }
}

/// True if a result for `looked_up` still belongs on a view showing `displayed`.
pub fn is_current(displayed: &str, looked_up: &str) -> bool {
    normalize_term(displayed) == normalize_term(looked_up)
}

// ══════════════════════════════════════════════════════════════════════════
// Gloss
// ══════════════════════════════════════════════════════════════════════════

/// What the lookup popup shows for one term.
#[derive(Debug, Clone, PartialEq)]
pub struct Gloss {
    pub term: String,
    pub phonetic: String,
    pub zh: String,
    pub definition: String,
    pub examples: Vec<ExampleSentence>,
    pub loading: bool,
}

impl Gloss {
    /// Start from word-list data; the network fills in the rest later.
    pub fn from_local(term: &str, local: Option<&WordEntry>) -> Self {
        Self {
            term: term.trim().to_string(),
            phonetic: String::new(),
            zh: local.map(|w| w.zh.clone()).unwrap_or_default(),
            definition: local.map(|w| w.hint.clone()).unwrap_or_default(),
            examples: local.map(|w| w.examples.clone()).unwrap_or_default(),
            loading: false,
        }
    }

    /// Merge a lookup result. Stale results are ignored and `false` is returned.
    pub fn apply(&mut self, result: &LookupResult) -> bool {
        if !is_current(&self.term, &result.term) {
            return false;
        }
        if !result.phonetic.is_empty() {
            self.phonetic = result.phonetic.clone();
        }
        if self.zh.is_empty() && !result.zh.is_empty() {
            self.zh = result.zh.clone();
        }
        if !result.definition.is_empty() {
            self.definition = result.definition.clone();
        }
        self.loading = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDictionary {
        calls: AtomicUsize,
    }

    impl DictionaryProvider for FakeDictionary {
        fn lookup(&self, term: &str) -> Result<LookupResult, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if term == "missing" {
                return Err(LookupError::NotFound(term.to_string()));
            }
            let mut result = LookupResult::empty(term);
            result.definition = format!("meaning of {term}");
            Ok(result)
        }
    }

    fn wait_for(lookups: &mut Lookups, count: usize) -> Vec<LookupMessage> {
        let mut messages = Vec::new();
        for _ in 0..200 {
            messages.extend(lookups.poll());
            if messages.len() >= count {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        messages
    }

    #[test]
    fn test_parse_dictionary_entry() {
        let json = r#"[{
            "word": "measure",
            "phonetic": "",
            "phonetics": [
                {"text": "/ˈmɛʒə/", "audio": ""},
                {"audio": "https://example.org/measure-us.mp3"},
                {"audio": "https://example.org/measure-uk.mp3"}
            ],
            "meanings": [{"definitions": [{"definition": "Find the size of something."}]}]
        }]"#;
        let entries: Vec<ApiEntry> = serde_json::from_str(json).unwrap();
        let mut result = LookupResult::empty("measure");
        fill_from_entries(&mut result, &entries);
        assert_eq!(result.phonetic, "/ˈmɛʒə/");
        assert_eq!(result.audio, "https://example.org/measure-uk.mp3");
        assert_eq!(result.definition, "Find the size of something.");
    }

    #[test]
    fn test_parse_translation() {
        let json = r#"{"responseData": {"translatedText": "测量", "match": 1}}"#;
        let response: TranslationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.response_data.and_then(|d| d.translated_text).as_deref(),
            Some("测量")
        );
    }

    #[test]
    fn test_cache_ttl() {
        let mut cache = LookupCache::default();
        let now = Local::now();
        let mut result = LookupResult::empty("Area");
        result.fetched_at = now - chrono::Duration::days(3);
        cache.insert(result);

        assert!(cache.get_fresh("area", chrono::Duration::days(14), now).is_some());
        assert!(cache.get_fresh(" AREA ", chrono::Duration::days(14), now).is_some());
        assert!(cache.get_fresh("area", chrono::Duration::days(2), now).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_gloss_ignores_stale_results() {
        let mut gloss = Gloss::from_local("plant", Some(&WordEntry::new("plant", "植物")));
        gloss.loading = true;

        let mut stale = LookupResult::empty("magnet");
        stale.definition = "attracts iron".into();
        assert!(!gloss.apply(&stale));
        assert!(gloss.definition.is_empty());
        assert!(gloss.loading);

        let mut fresh = LookupResult::empty("Plant");
        fresh.zh = "工厂".into();
        fresh.phonetic = "/plɑːnt/".into();
        fresh.definition = "A living organism.".into();
        assert!(gloss.apply(&fresh));
        assert_eq!(gloss.zh, "植物");
        assert_eq!(gloss.phonetic, "/plɑːnt/");
        assert_eq!(gloss.definition, "A living organism.");
        assert!(!gloss.loading);
    }

    #[test]
    fn test_offline_provider_fails() {
        assert!(matches!(
            OfflineDictionary.lookup("area"),
            Err(LookupError::Offline)
        ));
    }

    #[test]
    fn test_background_lookups_dedupe() {
        let provider = Arc::new(FakeDictionary {
            calls: AtomicUsize::new(0),
        });
        let mut lookups = Lookups::new(provider.clone());

        lookups.request("area");
        lookups.request("Area ");
        lookups.request("missing");
        assert!(lookups.is_pending("AREA"));

        let messages = wait_for(&mut lookups, 2);
        assert_eq!(messages.len(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(!lookups.is_pending("area"));

        let area = messages.iter().find(|m| m.term == "area").unwrap();
        assert_eq!(
            area.result.as_ref().map(|r| r.definition.as_str()).ok(),
            Some("meaning of area")
        );
        let missing = messages.iter().find(|m| m.term == "missing").unwrap();
        assert!(missing.result.is_err());
    }
}
