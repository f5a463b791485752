//! Main application state and logic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use log::{error, info};
use rand::rngs::ThreadRng;
use rand::Rng;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{block::BorderType, Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::theme::{Theme, ThemeName};
use super::widgets::{
    truncate, CardWidget, GlossPopup, KeyHints, Logo, OptionList, OptionRow, QuizSummary, ScoreBar,
};
use crate::annotate::annotate;
use crate::config::{Config, MAX_CACHE_TTL_DAYS, MAX_QUIZ_SIZE};
use crate::dataset::{DataLibrary, SubjectData};
use crate::dictionary::{is_current, DictionaryProvider, Gloss, LookupError, LookupResult, Lookups};
use crate::models::{Subject, WordEntry};
use crate::progress::Progress;
use crate::quiz::{pool_weights, tag_weight, QuizField, QuizSession};
use crate::storage::ProgressStore;

// ══════════════════════════════════════════════════════════════════════════
// Application State
// ══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Screen {
    Home,
    Read,
    Quiz,
    WordList,
    Dictionary,
    Wordbook,
    Progress,
    Settings,
}

/// Rows on the home screen.
#[derive(Debug, Clone, Copy, PartialEq)]
enum HomeItem {
    Subject(Subject),
    Dictionary,
    Wordbook,
    Progress,
    Settings,
}

fn home_items() -> Vec<HomeItem> {
    let mut items: Vec<HomeItem> = Subject::all().iter().map(|s| HomeItem::Subject(*s)).collect();
    items.extend([
        HomeItem::Dictionary,
        HomeItem::Wordbook,
        HomeItem::Progress,
        HomeItem::Settings,
    ]);
    items
}

const SETTINGS_ROWS: usize = 5;

pub struct App {
    pub screen: Screen,
    pub running: bool,

    // Config and theme
    pub config: Config,
    pub theme: Theme,

    // Storage
    store: ProgressStore,
    pub progress: Progress,
    library: DataLibrary,
    lookups: Lookups,
    offline: bool,
    rng: ThreadRng,

    // Home
    home_state: ListState,

    // Current subject
    subject: Subject,
    card_idx: HashMap<Subject, usize>,
    unit_cursor: usize,

    // Quiz state
    quiz: Option<QuizSession>,
    quiz_error: Option<String>,
    quiz_field: QuizField,
    option_cursor: usize,

    // Subject word list
    word_query: String,
    word_list_state: ListState,

    // Dictionary page
    dict_query: String,
    dict_editing: bool,
    dict_term: String,
    dict_result: Option<LookupResult>,
    dict_error: Option<String>,

    // Wordbook page
    bank_query: String,
    bank_searching: bool,
    bank_list_state: ListState,
    delete_pending: bool,
    clear_pending: bool,

    // Progress and settings pages
    progress_scroll: u16,
    settings_state: ListState,

    // Lookup popup over any screen
    gloss: Option<Gloss>,

    // Status message (shown temporarily)
    pub status_message: Option<(String, Instant)>,
}

impl App {
    pub fn new(
        config: Config,
        store: ProgressStore,
        progress: Progress,
        mut library: DataLibrary,
        provider: Arc<dyn DictionaryProvider>,
        offline: bool,
    ) -> Self {
        for subject in Subject::all() {
            library.get(*subject);
        }
        let theme = Theme::from_name(&config.theme);

        Self {
            screen: Screen::Home,
            running: true,
            config,
            theme,
            store,
            progress,
            library,
            lookups: Lookups::new(provider),
            offline,
            rng: rand::rng(),
            home_state: ListState::default().with_selected(Some(0)),
            subject: Subject::Math,
            card_idx: HashMap::new(),
            unit_cursor: 0,
            quiz: None,
            quiz_error: None,
            quiz_field: QuizField::Task,
            option_cursor: 0,
            word_query: String::new(),
            word_list_state: ListState::default(),
            dict_query: String::new(),
            dict_editing: true,
            dict_term: String::new(),
            dict_result: None,
            dict_error: None,
            bank_query: String::new(),
            bank_searching: false,
            bank_list_state: ListState::default(),
            delete_pending: false,
            clear_pending: false,
            progress_scroll: 0,
            settings_state: ListState::default().with_selected(Some(0)),
            gloss: None,
            status_message: None,
        }
    }

    fn data(&self) -> Option<&SubjectData> {
        self.library.cached(self.subject)
    }

    fn lookups_enabled(&self) -> bool {
        self.config.online_lookup && !self.offline
    }

    pub fn set_status(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    fn save_progress(&mut self) {
        if let Err(e) = self.store.save(&self.progress) {
            error!("failed to save progress: {:#}", e);
            self.set_status(format!("Save failed: {}", e));
        }
    }

    fn save_config(&mut self) {
        if let Err(e) = self.config.save() {
            error!("failed to save config: {:#}", e);
            self.set_status(format!("Saving settings failed: {}", e));
        }
    }

    pub fn cycle_theme(&mut self) {
        let new_theme_name = self.theme.name.next();
        self.theme = Theme::new(new_theme_name);
        self.config.theme = new_theme_name.as_str().to_string();
        self.save_config();
    }

    fn toggle_chinese(&mut self) {
        self.config.show_chinese = !self.config.show_chinese;
        self.save_config();
    }

    pub fn export_backup(&mut self) {
        let path = ProgressStore::default_backup_path();
        match self.store.export_backup(&path, &self.config, &self.progress) {
            Ok(count) => {
                self.set_status(format!("Exported {} words to {}", count, path.display()));
            }
            Err(e) => {
                error!("export failed: {:#}", e);
                self.set_status(format!("Export failed: {}", e));
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Reading
    // ══════════════════════════════════════════════════════════════════════

    fn open_subject(&mut self, subject: Subject) {
        if self.subject != subject {
            self.quiz = None;
            self.quiz_error = None;
            self.word_query.clear();
        }
        self.subject = subject;
        self.unit_cursor = 0;
        self.screen = Screen::Read;
    }

    fn card_count(&self) -> usize {
        self.data().map_or(0, |d| d.instructions.len())
    }

    fn current_card_index(&self) -> usize {
        let count = self.card_count();
        let idx = self.card_idx.get(&self.subject).copied().unwrap_or(0);
        if count == 0 {
            0
        } else {
            idx % count
        }
    }

    fn move_card(&mut self, forward: bool) {
        let count = self.card_count();
        if count == 0 {
            return;
        }
        let idx = self.current_card_index();
        let next = if forward { (idx + 1) % count } else { (idx + count - 1) % count };
        self.card_idx.insert(self.subject, next);
        self.unit_cursor = 0;
    }

    fn random_card(&mut self) {
        let count = self.card_count();
        if count == 0 {
            return;
        }
        let next = self.rng.random_range(0..count);
        self.card_idx.insert(self.subject, next);
        self.unit_cursor = 0;
    }

    fn unit_count(&self) -> usize {
        let Some(data) = self.data() else {
            return 0;
        };
        data.instructions
            .get(self.current_card_index())
            .map_or(0, |card| annotate(&card.en, &data.phrase_index).unit_count())
    }

    fn move_unit(&mut self, forward: bool) {
        let count = self.unit_count();
        if count == 0 {
            return;
        }
        let cursor = self.unit_cursor.min(count - 1);
        self.unit_cursor = if forward { (cursor + 1) % count } else { (cursor + count - 1) % count };
    }

    /// Text of the focused lookup unit, whitespace collapsed.
    fn focused_unit(&self) -> Option<String> {
        let data = self.data()?;
        let card = data.instructions.get(self.current_card_index())?;
        let annotation = annotate(&card.en, &data.phrase_index);
        let unit = annotation.unit(self.unit_cursor)?;
        Some(unit.text.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    /// Word-list entry for `term`, current subject first.
    fn local_entry(&self, term: &str) -> Option<&WordEntry> {
        self.data().and_then(|d| d.lookup_word(term)).or_else(|| {
            Subject::all()
                .iter()
                .filter_map(|s| self.library.cached(*s))
                .find_map(|d| d.lookup_word(term))
        })
    }

    fn open_gloss(&mut self, term: &str) {
        let mut gloss = Gloss::from_local(term, self.local_entry(term));
        if let Some(hit) = self
            .progress
            .lookup_cache
            .get_fresh(term, self.config.cache_ttl(), Local::now())
        {
            gloss.apply(hit);
        } else if self.lookups_enabled() {
            gloss.loading = true;
            self.lookups.request(term);
        }
        self.gloss = Some(gloss);
    }

    fn add_word(&mut self, term: &str, fallback_zh: &str) {
        let (zh, id) = match self.local_entry(term) {
            Some(entry) => (entry.zh.clone(), entry.id.clone()),
            None => (fallback_zh.to_string(), None),
        };
        let subject = matches!(self.screen, Screen::Read | Screen::Quiz | Screen::WordList)
            .then_some(self.subject);

        let added = self.progress.add_word(term, &zh, subject, id.as_deref(), Local::now());
        self.save_progress();
        if added {
            self.set_status(format!("Added \"{}\" to word bank", term));
        } else {
            self.set_status(format!("\"{}\" is already in the word bank", term));
        }
    }

    /// Apply finished lookups: cache everything, update views still showing the term.
    pub fn drain_lookups(&mut self) {
        let messages = self.lookups.poll();
        if messages.is_empty() {
            return;
        }

        let mut cached = false;
        for message in messages {
            match message.result {
                Ok(result) => {
                    if let Some(gloss) = self.gloss.as_mut() {
                        gloss.apply(&result);
                    }
                    if is_current(&self.dict_term, &result.term) {
                        self.dict_result = Some(result.clone());
                        self.dict_error = None;
                    }
                    self.progress.lookup_cache.insert(result);
                    cached = true;
                }
                Err(e) => {
                    if let Some(gloss) = self.gloss.as_mut() {
                        if is_current(&gloss.term, &message.term) {
                            gloss.loading = false;
                        }
                    }
                    if is_current(&self.dict_term, &message.term) {
                        self.dict_error = Some(e.to_string());
                    }
                }
            }
        }
        if cached {
            self.save_progress();
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Quiz
    // ══════════════════════════════════════════════════════════════════════

    fn start_quiz(&mut self) {
        self.quiz_field = QuizField::Task;
        self.option_cursor = 0;
        self.screen = Screen::Quiz;

        let subject = self.subject;
        let data = self.library.get(subject);
        let stats = self.progress.stats(subject);
        match QuizSession::new(data, stats, self.config.quiz_size, &mut self.rng) {
            Ok(session) => {
                info!("started {} quiz with {} cards", subject.key(), session.items.len());
                self.quiz = Some(session);
                self.quiz_error = None;
            }
            Err(e) => {
                info!("cannot start {} quiz: {}", subject.key(), e);
                self.quiz = None;
                self.quiz_error = Some(e.to_string());
            }
        }
    }

    fn enter_quiz(&mut self) {
        match &self.quiz {
            Some(session) if session.subject == self.subject => self.screen = Screen::Quiz,
            _ => self.start_quiz(),
        }
    }

    fn current_option_count(&self) -> usize {
        self.quiz
            .as_ref()
            .and_then(|q| q.current_item())
            .map_or(0, |item| item.options(self.quiz_field).len())
    }

    fn toggle_option(&mut self) {
        let field = self.quiz_field;
        let cursor = self.option_cursor;
        if let Some(session) = self.quiz.as_mut() {
            let option = session
                .current_item()
                .and_then(|item| item.options(field).get(cursor))
                .cloned();
            if let Some(option) = option {
                session.toggle(field, &option);
            }
        }
    }

    fn submit_or_advance(&mut self) {
        let Some(session) = self.quiz.as_mut() else {
            return;
        };
        if session.current_result().is_some() {
            session.advance();
            self.quiz_field = QuizField::Task;
            self.option_cursor = 0;
            return;
        }

        let subject = session.subject;
        if let Some(outcome) = session.submit() {
            self.progress.record_outcome(subject, &outcome, Local::now());
            self.save_progress();
        }
    }

    fn skip_card(&mut self) {
        let Some(session) = self.quiz.as_mut() else {
            return;
        };
        let subject = session.subject;
        if let Some(outcome) = session.skip() {
            self.progress.record_outcome(subject, &outcome, Local::now());
            self.save_progress();
        }
    }

    fn add_card_words(&mut self) {
        let Some(text) = self
            .quiz
            .as_ref()
            .and_then(|q| q.current_item())
            .map(|item| item.card.en.clone())
        else {
            return;
        };
        let data = self.library.get(self.subject);
        let added = self.progress.add_words_from_text(&text, data, Local::now());
        self.save_progress();
        self.set_status(format!("Added {} new words to word bank", added));
    }

    // ══════════════════════════════════════════════════════════════════════
    // Dictionary and Wordbook
    // ══════════════════════════════════════════════════════════════════════

    fn submit_dictionary_query(&mut self) {
        let term = self.dict_query.trim().to_string();
        if term.is_empty() {
            return;
        }
        self.dict_editing = false;
        self.dict_error = None;
        self.dict_result = self
            .progress
            .lookup_cache
            .get_fresh(&term, self.config.cache_ttl(), Local::now())
            .cloned();

        if self.dict_result.is_none() {
            if self.lookups_enabled() {
                self.lookups.request(&term);
            } else {
                self.dict_error = Some(LookupError::Offline.to_string());
            }
        }
        self.dict_term = term;
    }

    fn bank_len(&self) -> usize {
        self.progress.search_word_bank(&self.bank_query).len()
    }

    fn selected_bank_entry(&self) -> Option<(String, String)> {
        let i = self.bank_list_state.selected()?;
        self.progress
            .search_word_bank(&self.bank_query)
            .get(i)
            .map(|e| (e.id.clone(), e.term.clone()))
    }

    fn reset_bank_selection(&mut self) {
        let selected = (self.bank_len() > 0).then_some(0);
        self.bank_list_state.select(selected);
    }

    fn delete_selected_word(&mut self) {
        if let Some((id, term)) = self.selected_bank_entry() {
            self.progress.remove_word(&id);
            self.save_progress();
            self.set_status(format!("Removed \"{}\"", term));

            let len = self.bank_len();
            if len == 0 {
                self.bank_list_state.select(None);
            } else if self.bank_list_state.selected().is_some_and(|i| i >= len) {
                self.bank_list_state.select(Some(len - 1));
            }
        }
        self.delete_pending = false;
    }

    fn clear_word_bank(&mut self) {
        let count = self.progress.word_bank.len();
        self.progress.clear_word_bank();
        self.save_progress();
        self.bank_list_state.select(None);
        self.clear_pending = false;
        self.set_status(format!("Cleared {} words", count));
    }

    // ══════════════════════════════════════════════════════════════════════
    // Settings
    // ══════════════════════════════════════════════════════════════════════

    fn change_setting(&mut self, row: usize, up: bool) {
        match row {
            0 => {
                self.cycle_theme();
                return;
            }
            1 => self.config.show_chinese = !self.config.show_chinese,
            2 => {
                let size = self.config.quiz_size.clamp(1, MAX_QUIZ_SIZE);
                self.config.quiz_size = if up {
                    (size + 1).min(MAX_QUIZ_SIZE)
                } else {
                    size.saturating_sub(1).max(1)
                };
            }
            3 => self.config.online_lookup = !self.config.online_lookup,
            4 => {
                let days = self.config.cache_ttl_days.clamp(0, MAX_CACHE_TTL_DAYS);
                self.config.cache_ttl_days = if up {
                    (days + 1).min(MAX_CACHE_TTL_DAYS)
                } else {
                    (days - 1).max(0)
                };
            }
            _ => return,
        }
        self.save_config();
    }

    // ══════════════════════════════════════════════════════════════════════
    // Event Handling
    // ══════════════════════════════════════════════════════════════════════

    pub fn handle_events(&mut self) -> anyhow::Result<()> {
        self.drain_lookups();

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    return Ok(());
                }

                if self.gloss.is_some() {
                    self.handle_gloss_keys(key.code);
                    return Ok(());
                }

                match self.screen {
                    Screen::Home => self.handle_home_keys(key.code),
                    Screen::Read => self.handle_read_keys(key.code),
                    Screen::Quiz => self.handle_quiz_keys(key.code),
                    Screen::WordList => self.handle_word_list_keys(key.code),
                    Screen::Dictionary => self.handle_dictionary_keys(key.code),
                    Screen::Wordbook => self.handle_wordbook_keys(key.code),
                    Screen::Progress => self.handle_progress_keys(key.code),
                    Screen::Settings => self.handle_settings_keys(key.code),
                }
            }
        }
        Ok(())
    }

    fn handle_gloss_keys(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => self.gloss = None,
            KeyCode::Char('a') | KeyCode::Char('w') => {
                if let Some(gloss) = self.gloss.take() {
                    self.add_word(&gloss.term, &gloss.zh);
                }
            }
            _ => {}
        }
    }

    fn handle_home_keys(&mut self, key: KeyCode) {
        let items = home_items();
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('t') => self.cycle_theme(),
            KeyCode::Char('x') => self.export_backup(),
            KeyCode::Up | KeyCode::Char('k') => {
                let i = self.home_state.selected().unwrap_or(0);
                let new_i = if i == 0 { items.len() - 1 } else { i - 1 };
                self.home_state.select(Some(new_i));
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let i = self.home_state.selected().unwrap_or(0);
                let new_i = if i >= items.len() - 1 { 0 } else { i + 1 };
                self.home_state.select(Some(new_i));
            }
            KeyCode::Enter => {
                let Some(item) = self.home_state.selected().and_then(|i| items.get(i)) else {
                    return;
                };
                match *item {
                    HomeItem::Subject(subject) => self.open_subject(subject),
                    HomeItem::Dictionary => {
                        self.dict_editing = true;
                        self.screen = Screen::Dictionary;
                    }
                    HomeItem::Wordbook => {
                        self.bank_searching = false;
                        self.delete_pending = false;
                        self.clear_pending = false;
                        self.reset_bank_selection();
                        self.screen = Screen::Wordbook;
                    }
                    HomeItem::Progress => {
                        self.progress_scroll = 0;
                        self.screen = Screen::Progress;
                    }
                    HomeItem::Settings => self.screen = Screen::Settings,
                }
            }
            _ => {}
        }
    }

    /// Subtab switching shared by the subject screens.
    fn switch_subtab(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Char('1') => self.screen = Screen::Read,
            KeyCode::Char('2') => self.enter_quiz(),
            KeyCode::Char('3') => {
                self.word_list_state.select(Some(0));
                self.screen = Screen::WordList;
            }
            _ => return false,
        }
        true
    }

    fn handle_read_keys(&mut self, key: KeyCode) {
        if self.switch_subtab(key) {
            return;
        }
        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Home,
            KeyCode::Left | KeyCode::Char('h') => self.move_card(false),
            KeyCode::Right | KeyCode::Char('l') => self.move_card(true),
            KeyCode::Char('r') => self.random_card(),
            KeyCode::Tab => self.move_unit(true),
            KeyCode::BackTab => self.move_unit(false),
            KeyCode::Enter => {
                if let Some(term) = self.focused_unit() {
                    self.open_gloss(&term);
                }
            }
            KeyCode::Char('w') => {
                if let Some(term) = self.focused_unit() {
                    self.add_word(&term, "");
                }
            }
            KeyCode::Char('c') => self.toggle_chinese(),
            KeyCode::Char('t') => self.cycle_theme(),
            _ => {}
        }
    }

    fn handle_quiz_keys(&mut self, key: KeyCode) {
        if self.switch_subtab(key) {
            return;
        }
        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Home,
            KeyCode::Char('n') => self.start_quiz(),
            KeyCode::Tab => {
                self.quiz_field = next_field(self.quiz_field, true);
                self.option_cursor = 0;
            }
            KeyCode::BackTab => {
                self.quiz_field = next_field(self.quiz_field, false);
                self.option_cursor = 0;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                let count = self.current_option_count();
                if count > 0 {
                    self.option_cursor = (self.option_cursor + count - 1) % count;
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let count = self.current_option_count();
                if count > 0 {
                    self.option_cursor = (self.option_cursor + 1) % count;
                }
            }
            KeyCode::Char(' ') => self.toggle_option(),
            KeyCode::Enter => self.submit_or_advance(),
            KeyCode::Char('s') => self.skip_card(),
            KeyCode::Char('w') => self.add_card_words(),
            KeyCode::Char('c') => self.toggle_chinese(),
            KeyCode::Char('t') => self.cycle_theme(),
            _ => {}
        }
    }

    fn handle_word_list_keys(&mut self, key: KeyCode) {
        let count = self.data().map_or(0, |d| d.search_words(&self.word_query).len());
        match key {
            KeyCode::Esc => self.screen = Screen::Read,
            KeyCode::Up => {
                if count > 0 {
                    let i = self.word_list_state.selected().unwrap_or(0);
                    self.word_list_state.select(Some(if i == 0 { count - 1 } else { i - 1 }));
                }
            }
            KeyCode::Down => {
                if count > 0 {
                    let i = self.word_list_state.selected().unwrap_or(0);
                    self.word_list_state.select(Some(if i + 1 >= count { 0 } else { i + 1 }));
                }
            }
            KeyCode::Enter => {
                let term = self.word_list_state.selected().and_then(|i| {
                    self.data()
                        .and_then(|d| d.search_words(&self.word_query).get(i).map(|w| w.term.clone()))
                });
                if let Some(term) = term {
                    self.open_gloss(&term);
                }
            }
            KeyCode::Backspace => {
                self.word_query.pop();
                self.word_list_state.select(Some(0));
            }
            KeyCode::Char(c) => {
                self.word_query.push(c);
                self.word_list_state.select(Some(0));
            }
            _ => {}
        }
    }

    fn handle_dictionary_keys(&mut self, key: KeyCode) {
        if self.dict_editing {
            match key {
                KeyCode::Esc => {
                    if self.dict_term.is_empty() {
                        self.screen = Screen::Home;
                    } else {
                        self.dict_editing = false;
                    }
                }
                KeyCode::Enter => self.submit_dictionary_query(),
                KeyCode::Backspace => {
                    self.dict_query.pop();
                }
                KeyCode::Char(c) => self.dict_query.push(c),
                _ => {}
            }
            return;
        }

        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Home,
            KeyCode::Char('e') | KeyCode::Char('/') => self.dict_editing = true,
            KeyCode::Char('a') => {
                if !self.dict_term.is_empty() {
                    let term = self.dict_term.clone();
                    let zh = self.dict_result.as_ref().map(|r| r.zh.clone()).unwrap_or_default();
                    self.add_word(&term, &zh);
                }
            }
            KeyCode::Char('g') => {
                if !self.dict_term.is_empty() {
                    let term = self.dict_term.clone();
                    self.open_gloss(&term);
                }
            }
            KeyCode::Char('t') => self.cycle_theme(),
            _ => {}
        }
    }

    fn handle_wordbook_keys(&mut self, key: KeyCode) {
        if self.bank_searching {
            match key {
                KeyCode::Esc | KeyCode::Enter => self.bank_searching = false,
                KeyCode::Backspace => {
                    self.bank_query.pop();
                    self.reset_bank_selection();
                }
                KeyCode::Char(c) => {
                    self.bank_query.push(c);
                    self.reset_bank_selection();
                }
                _ => {}
            }
            return;
        }

        let delete_pending = std::mem::take(&mut self.delete_pending);
        let clear_pending = std::mem::take(&mut self.clear_pending);
        let len = self.bank_len();
        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Home,
            KeyCode::Char('/') => self.bank_searching = true,
            KeyCode::Up | KeyCode::Char('k') => {
                if len > 0 {
                    let i = self.bank_list_state.selected().unwrap_or(0);
                    self.bank_list_state.select(Some(if i == 0 { len - 1 } else { i - 1 }));
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if len > 0 {
                    let i = self.bank_list_state.selected().unwrap_or(0);
                    self.bank_list_state.select(Some(if i + 1 >= len { 0 } else { i + 1 }));
                }
            }
            KeyCode::Enter => {
                if let Some((_, term)) = self.selected_bank_entry() {
                    self.open_gloss(&term);
                }
            }
            KeyCode::Char('d') => {
                if delete_pending {
                    self.delete_selected_word();
                } else if self.selected_bank_entry().is_some() {
                    self.delete_pending = true;
                }
            }
            KeyCode::Char('C') => {
                if clear_pending {
                    self.clear_word_bank();
                } else if !self.progress.word_bank.is_empty() {
                    self.clear_pending = true;
                }
            }
            KeyCode::Char('x') => self.export_backup(),
            KeyCode::Char('t') => self.cycle_theme(),
            _ => {}
        }
    }

    fn handle_progress_keys(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Home,
            KeyCode::Up | KeyCode::Char('k') => {
                self.progress_scroll = self.progress_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.progress_scroll = self.progress_scroll.saturating_add(1);
            }
            KeyCode::Char('x') => self.export_backup(),
            KeyCode::Char('t') => self.cycle_theme(),
            _ => {}
        }
    }

    fn handle_settings_keys(&mut self, key: KeyCode) {
        let row = self.settings_state.selected().unwrap_or(0);
        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Home,
            KeyCode::Up | KeyCode::Char('k') => {
                self.settings_state.select(Some((row + SETTINGS_ROWS - 1) % SETTINGS_ROWS));
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.settings_state.select(Some((row + 1) % SETTINGS_ROWS));
            }
            KeyCode::Left | KeyCode::Char('h') => self.change_setting(row, false),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Enter | KeyCode::Char(' ') => {
                self.change_setting(row, true)
            }
            _ => {}
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Rendering
    // ══════════════════════════════════════════════════════════════════════

    pub fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();

        // Clear with background
        frame.render_widget(Clear, area);
        frame.render_widget(
            Block::default().style(Style::default().bg(self.theme.colors.bg_dark)),
            area,
        );

        let chunks = Layout::vertical([
            Constraint::Min(5),      // Screen
            Constraint::Length(1),   // Status
            Constraint::Length(2),   // Hints
        ])
        .split(area);

        match self.screen {
            Screen::Home => self.render_home(frame, chunks[0]),
            Screen::Read => self.render_read(frame, chunks[0]),
            Screen::Quiz => self.render_quiz(frame, chunks[0]),
            Screen::WordList => self.render_word_list(frame, chunks[0]),
            Screen::Dictionary => self.render_dictionary(frame, chunks[0]),
            Screen::Wordbook => self.render_wordbook(frame, chunks[0]),
            Screen::Progress => self.render_progress(frame, chunks[0]),
            Screen::Settings => self.render_settings(frame, chunks[0]),
        }

        self.render_status(frame, chunks[1]);
        self.render_hints(frame, chunks[2]);

        if let Some(ref gloss) = self.gloss {
            let width = (area.width * 3 / 5).max(30).min(area.width);
            let height = GlossPopup::height(gloss, width).min(area.height);
            let popup = Rect {
                x: area.x + (area.width - width) / 2,
                y: area.y + (area.height - height) / 2,
                width,
                height,
            };
            frame.render_widget(GlossPopup::new(gloss, &self.theme), popup);
        }
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        // Show status message if recent (within 5 seconds)
        if let Some((ref msg, time)) = self.status_message {
            if time.elapsed().as_secs() < 5 {
                let status = Paragraph::new(msg.as_str())
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(self.theme.colors.success));
                frame.render_widget(status, area);
            }
        }
    }

    fn render_hints(&self, frame: &mut Frame, area: Rect) {
        let theme_hint = format!("[{}]", self.theme.name.display_name());
        let chinese_hint = if self.config.show_chinese { "hide 中文" } else { "show 中文" };
        let hints: Vec<(&str, &str)> = if self.gloss.is_some() {
            vec![("a", "add"), ("Esc", "close")]
        } else {
            match self.screen {
                Screen::Home => vec![
                    ("j/k", "nav"),
                    ("Enter", "open"),
                    ("x", "export"),
                    ("t", theme_hint.as_str()),
                    ("q", "quit"),
                ],
                Screen::Read => vec![
                    ("←/→", "card"),
                    ("r", "random"),
                    ("Tab", "word"),
                    ("Enter", "look up"),
                    ("w", "save word"),
                    ("c", chinese_hint),
                    ("2", "quiz"),
                    ("3", "words"),
                    ("Esc", "back"),
                ],
                Screen::Quiz => {
                    if self.quiz.as_ref().is_some_and(|q| q.is_finished()) {
                        vec![("n", "new round"), ("1", "read"), ("Esc", "back")]
                    } else if self.quiz.as_ref().and_then(|q| q.current_result()).is_some() {
                        vec![("Enter", "next"), ("w", "save words"), ("n", "restart"), ("Esc", "back")]
                    } else {
                        vec![
                            ("Tab", "field"),
                            ("j/k", "option"),
                            ("Space", "toggle"),
                            ("Enter", "submit"),
                            ("s", "skip"),
                            ("w", "save words"),
                            ("Esc", "back"),
                        ]
                    }
                }
                Screen::WordList => vec![
                    ("type", "search"),
                    ("↑/↓", "nav"),
                    ("Enter", "look up"),
                    ("Esc", "back"),
                ],
                Screen::Dictionary if self.dict_editing => {
                    vec![("Enter", "look up"), ("Esc", "done")]
                }
                Screen::Dictionary => vec![
                    ("e", "edit"),
                    ("a", "save word"),
                    ("g", "popup"),
                    ("Esc", "back"),
                ],
                Screen::Wordbook if self.bank_searching => {
                    vec![("type", "filter"), ("Enter", "done")]
                }
                Screen::Wordbook if self.delete_pending => {
                    vec![("d", "confirm delete"), ("any", "cancel")]
                }
                Screen::Wordbook if self.clear_pending => {
                    vec![("C", "confirm clear all"), ("any", "cancel")]
                }
                Screen::Wordbook => vec![
                    ("j/k", "nav"),
                    ("/", "search"),
                    ("Enter", "look up"),
                    ("d", "delete"),
                    ("C", "clear"),
                    ("x", "export"),
                    ("Esc", "back"),
                ],
                Screen::Progress => vec![("j/k", "scroll"), ("x", "export"), ("Esc", "back")],
                Screen::Settings => vec![
                    ("j/k", "nav"),
                    ("←/→", "change"),
                    ("Esc", "back"),
                ],
            }
        };
        frame.render_widget(KeyHints::new(&hints, &self.theme), area);
    }

    fn render_home(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::vertical([
            Constraint::Length(1),   // Top padding
            Constraint::Length(7),   // Logo
            Constraint::Length(1),   // Spacing
            Constraint::Min(5),      // Menu
        ])
        .split(area);

        frame.render_widget(Logo::new(&self.theme), chunks[1]);

        let list_area = centered_rect(60, 100, chunks[3]);
        let muted = Style::default().fg(self.theme.colors.text_muted);
        let items: Vec<ListItem> = home_items()
            .into_iter()
            .map(|item| {
                let (name, zh, detail) = match item {
                    HomeItem::Subject(subject) => {
                        let cards = self.library.cached(subject).map_or(0, |d| d.instructions.len());
                        (subject.name_en(), subject.name_zh(), format!(" ({} cards)", cards))
                    }
                    HomeItem::Dictionary => ("Dictionary", "词典", String::new()),
                    HomeItem::Wordbook => (
                        "Word bank",
                        "生词本",
                        format!(" ({} words)", self.progress.word_bank.len()),
                    ),
                    HomeItem::Progress => ("Progress", "学习进度", String::new()),
                    HomeItem::Settings => ("Settings", "设置", String::new()),
                };
                ListItem::new(Line::from(vec![
                    Span::styled(name, Style::default().add_modifier(Modifier::BOLD)),
                    Span::styled(format!(" {}", zh), self.theme.chinese()),
                    Span::styled(detail, muted),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(self.theme.colors.primary))
                    .title(" Subjects ")
                    .title_style(self.theme.highlight()),
            )
            .highlight_style(self.theme.selected())
            .highlight_symbol("> ");

        frame.render_stateful_widget(list, list_area, &mut self.home_state);
    }

    /// Subject title with the active subtab marked.
    fn render_subject_header(&self, frame: &mut Frame, area: Rect) {
        let tab = |label: &'static str, screen: Screen| {
            if self.screen == screen {
                Span::styled(label, self.theme.key_highlight())
            } else {
                Span::styled(label, self.theme.dim())
            }
        };
        let lines = vec![
            Line::from(vec![
                Span::styled(self.subject.name_en(), self.theme.title()),
                Span::styled(format!(" {}", self.subject.name_zh()), self.theme.chinese()),
            ]),
            Line::from(vec![
                tab("1 Read", Screen::Read),
                Span::raw("   "),
                tab("2 Quiz", Screen::Quiz),
                Span::raw("   "),
                tab("3 Words", Screen::WordList),
            ]),
        ];
        frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), area);
    }

    fn render_read(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::vertical([
            Constraint::Length(3),   // Header
            Constraint::Min(8),      // Card
        ])
        .split(area);
        self.render_subject_header(frame, chunks[0]);

        let card_area = centered_rect(80, 100, chunks[1]);
        let idx = self.current_card_index();
        let Some(data) = self.data() else {
            return;
        };
        let Some(card) = data.instructions.get(idx) else {
            let empty = Paragraph::new("No instruction cards for this subject yet.")
                .alignment(Alignment::Center)
                .style(self.theme.muted());
            frame.render_widget(empty, card_area);
            return;
        };

        let annotation = annotate(&card.en, &data.phrase_index);
        let focus = (annotation.unit_count() > 0)
            .then(|| self.unit_cursor.min(annotation.unit_count() - 1));
        let mut title = format!("#{}/{}", idx + 1, data.instructions.len());
        if !card.topic.is_empty() {
            title.push_str(&format!(" · {}", card.topic));
        }
        let zh = self.config.show_chinese.then_some(card.zh.as_str());

        frame.render_widget(
            CardWidget::new(&annotation, focus, zh, title, &self.theme),
            card_area,
        );
    }

    fn render_quiz(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::vertical([
            Constraint::Length(3),   // Header
            Constraint::Length(1),   // Score
            Constraint::Length(1),   // Spacing
            Constraint::Min(6),      // Card
            Constraint::Length(10),  // Options
        ])
        .split(area);
        self.render_subject_header(frame, chunks[0]);

        let Some(session) = self.quiz.as_ref() else {
            let message = self
                .quiz_error
                .as_deref()
                .map(|e| format!("Not enough data to generate a quiz ({})", e))
                .unwrap_or_else(|| "Press n to start a quiz".to_string());
            let para = Paragraph::new(message)
                .alignment(Alignment::Center)
                .style(self.theme.muted());
            frame.render_widget(para, centered_rect(80, 50, chunks[3]));
            return;
        };

        frame.render_widget(
            ScoreBar::new(
                session.current + 1,
                session.items.len(),
                session.points(),
                session.correct_cards(),
                session.answered(),
                &self.theme,
            ),
            chunks[1],
        );

        let Some(item) = session.current_item() else {
            let summary_area = centered_rect(50, 60, Rect {
                height: chunks[3].height + chunks[4].height,
                ..chunks[3]
            });
            frame.render_widget(
                QuizSummary::new(
                    session.items.len(),
                    session.correct_cards(),
                    session.points(),
                    &self.theme,
                ),
                summary_area,
            );
            return;
        };
        let Some(data) = self.library.cached(session.subject) else {
            return;
        };

        let annotation = annotate(&item.card.en, &data.phrase_index);
        let zh = self.config.show_chinese.then_some(item.card.zh.as_str());
        let title = format!("#{}/{}", session.current + 1, session.items.len());
        frame.render_widget(
            CardWidget::new(&annotation, None, zh, title, &self.theme),
            centered_rect(90, 100, chunks[3]),
        );

        let columns = Layout::horizontal([
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ])
        .split(centered_rect(96, 100, chunks[4]));

        let result = session.current_result();
        let fields = [
            (QuizField::Task, "Task 任务", true),
            (QuizField::Notice, "Notice 注意", true),
            (QuizField::Output, "Output 作答形式", false),
        ];
        for ((field, title, multi), column) in fields.into_iter().zip(columns.iter()) {
            let rows = item
                .options(field)
                .iter()
                .map(|option| OptionRow {
                    label: data.patterns.label(option, self.config.show_chinese),
                    selected: session.selection.is_selected(field, option),
                    expected: result.map(|_| match field {
                        QuizField::Task => item.key.task.contains(option),
                        QuizField::Notice => item.key.notice.contains(option),
                        QuizField::Output => item.key.output == *option,
                    }),
                })
                .collect();
            let cursor = (result.is_none() && self.quiz_field == field).then_some(self.option_cursor);
            let heading = match result {
                Some(r) if r.scores.get(field) => format!("{} ✓", title),
                Some(_) => format!("{} ✗", title),
                None => title.to_string(),
            };
            frame.render_widget(
                OptionList::new(&heading, rows, cursor, multi, &self.theme),
                *column,
            );
        }
    }

    fn render_word_list(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::vertical([
            Constraint::Length(3),   // Header
            Constraint::Length(3),   // Search
            Constraint::Min(5),      // Results
        ])
        .split(area);
        self.render_subject_header(frame, chunks[0]);

        let inner = centered_rect(80, 100, chunks[1]);
        let search = Paragraph::new(self.word_query.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(self.theme.colors.accent))
                .title(" Search 搜索 ")
                .title_style(Style::default().fg(self.theme.colors.accent)),
        );
        frame.render_widget(search, inner);
        frame.set_cursor_position((
            inner.x + 1 + self.word_query.chars().count() as u16,
            inner.y + 1,
        ));

        let list_area = centered_rect(80, 100, chunks[2]);
        let width = list_area.width.saturating_sub(6) as usize;
        let Some(data) = self.library.cached(self.subject) else {
            return;
        };
        let matches = data.search_words(&self.word_query);
        let items: Vec<ListItem> = matches
            .iter()
            .map(|w| {
                let mut spans = vec![
                    Span::styled(w.term.as_str(), Style::default().add_modifier(Modifier::BOLD)),
                ];
                if !w.pos.is_empty() {
                    spans.push(Span::styled(format!(" {}", w.pos), self.theme.dim()));
                }
                spans.push(Span::styled(format!("  {}", w.zh), self.theme.chinese()));
                if !w.hint.is_empty() {
                    let used = w.term.len() + w.pos.len() + w.zh.chars().count() * 2 + 4;
                    spans.push(Span::styled(
                        format!("  {}", truncate(&w.hint, width.saturating_sub(used))),
                        self.theme.muted(),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(self.theme.colors.primary))
                    .title(format!(" {} words ", matches.len()))
                    .title_style(self.theme.highlight()),
            )
            .highlight_style(self.theme.selected())
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, list_area, &mut self.word_list_state);
    }

    fn render_dictionary(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::vertical([
            Constraint::Length(3),   // Title
            Constraint::Length(3),   // Input
            Constraint::Length(1),   // Spacing
            Constraint::Min(5),      // Result
        ])
        .split(centered_rect(70, 100, area));

        let title = Paragraph::new("Dictionary 词典")
            .alignment(Alignment::Center)
            .style(self.theme.title());
        frame.render_widget(title, chunks[0]);

        let input_style = if self.dict_editing {
            Style::default().fg(self.theme.colors.accent)
        } else {
            Style::default().fg(self.theme.colors.text_muted)
        };
        let input = Paragraph::new(self.dict_query.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(input_style)
                .title(" Word or phrase ")
                .title_style(input_style),
        );
        frame.render_widget(input, chunks[1]);
        if self.dict_editing {
            frame.set_cursor_position((
                chunks[1].x + 1 + self.dict_query.chars().count() as u16,
                chunks[1].y + 1,
            ));
        }

        if self.dict_term.is_empty() {
            return;
        }

        let label = |s: &'static str| Span::styled(s, self.theme.muted());
        let mut lines = vec![Line::from(Span::styled(self.dict_term.as_str(), self.theme.title()))];
        if let Some(entry) = self.local_entry(&self.dict_term) {
            lines.push(Line::from(vec![
                label("Word list: "),
                Span::styled(entry.zh.as_str(), self.theme.chinese()),
            ]));
        }
        if let Some(ref result) = self.dict_result {
            if !result.phonetic.is_empty() {
                lines.push(Line::from(vec![label("Phonetic: "), Span::raw(result.phonetic.as_str())]));
            }
            if !result.zh.is_empty() {
                lines.push(Line::from(vec![
                    label("中文: "),
                    Span::styled(result.zh.as_str(), self.theme.chinese()),
                ]));
            }
            if !result.definition.is_empty() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    result.definition.as_str(),
                    Style::default().fg(self.theme.colors.text),
                )));
            }
            if result.is_empty() {
                lines.push(Line::from(Span::styled("No dictionary data.", self.theme.dim())));
            }
        } else if self.lookups.is_pending(&self.dict_term) {
            lines.push(Line::from(Span::styled("查询中…", self.theme.dim())));
        } else if let Some(ref e) = self.dict_error {
            lines.push(Line::from(Span::styled(format!("Lookup failed: {}", e), self.theme.wrong())));
        }

        let result = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(self.theme.colors.primary)),
            );
        frame.render_widget(result, chunks[3]);
    }

    fn render_wordbook(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::vertical([
            Constraint::Length(3),   // Title
            Constraint::Length(3),   // Search
            Constraint::Min(5),      // List
        ])
        .split(centered_rect(80, 100, area));

        let title = Paragraph::new(format!("Word bank 生词本 ({})", self.progress.word_bank.len()))
            .alignment(Alignment::Center)
            .style(self.theme.title());
        frame.render_widget(title, chunks[0]);

        let search_style = if self.bank_searching {
            Style::default().fg(self.theme.colors.accent)
        } else {
            Style::default().fg(self.theme.colors.text_muted)
        };
        let search = Paragraph::new(self.bank_query.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(search_style)
                .title(" Filter ")
                .title_style(search_style),
        );
        frame.render_widget(search, chunks[1]);
        if self.bank_searching {
            frame.set_cursor_position((
                chunks[1].x + 1 + self.bank_query.chars().count() as u16,
                chunks[1].y + 1,
            ));
        }

        let muted = self.theme.muted();
        let items: Vec<ListItem> = self
            .progress
            .search_word_bank(&self.bank_query)
            .into_iter()
            .map(|e| {
                let subject = e.subject.map(|s| format!(" [{}]", s.name_zh())).unwrap_or_default();
                ListItem::new(Line::from(vec![
                    Span::styled(e.term.clone(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::styled(format!("  {}", e.zh), self.theme.chinese()),
                    Span::styled(subject, muted),
                    Span::styled(
                        format!("  ×{}  {}", e.seen, e.added_at.format("%Y-%m-%d")),
                        muted,
                    ),
                ]))
            })
            .collect();

        let border = if self.delete_pending || self.clear_pending {
            self.theme.colors.error
        } else {
            self.theme.colors.primary
        };
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(border))
                    .title(" Newest first ")
                    .title_style(self.theme.highlight()),
            )
            .highlight_style(self.theme.selected())
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, chunks[2], &mut self.bank_list_state);
    }

    fn render_progress(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::vertical([
            Constraint::Length(3),   // Title
            Constraint::Length(4),   // Overview
            Constraint::Length(1),   // Spacing
            Constraint::Min(5),      // Tag stats
        ])
        .split(centered_rect(70, 100, area));

        let title = Paragraph::new("Progress 学习进度")
            .alignment(Alignment::Center)
            .style(self.theme.title());
        frame.render_widget(title, chunks[0]);

        let value = |v: String| Span::styled(v, self.theme.highlight());
        let overview = Paragraph::new(vec![
            Line::from(vec![
                Span::styled("Saved words: ", self.theme.muted()),
                value(self.progress.word_bank.len().to_string()),
            ]),
            Line::from(vec![
                Span::styled("Cached lookups: ", self.theme.muted()),
                value(self.progress.lookup_cache.len().to_string()),
            ]),
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(self.theme.colors.primary))
                .title(" Overview ")
                .title_style(self.theme.highlight()),
        );
        frame.render_widget(overview, chunks[1]);

        let mut lines = Vec::new();
        for subject in Subject::all() {
            let stats = self.progress.stats(*subject);
            if stats.is_empty() {
                continue;
            }
            if !lines.is_empty() {
                lines.push(Line::default());
            }
            lines.push(Line::from(vec![
                Span::styled(subject.name_en(), self.theme.title()),
                Span::styled(format!(" {}", subject.name_zh()), self.theme.chinese()),
            ]));
            lines.push(Line::from(Span::styled(
                format!("  {:<24}{:>6}{:>7}{:>8}", "tag", "seen", "wrong", "weight"),
                self.theme.dim(),
            )));

            // Unseen tags in the pool draw at weight 1; retired tags keep their history.
            let pool = self.library.cached(*subject).map(|d| d.quiz_pool()).unwrap_or_default();
            let mut rows = pool_weights(&pool, stats);
            for (tag, stat) in stats {
                if !rows.iter().any(|(t, _)| t == tag) {
                    rows.push((tag.clone(), tag_weight(Some(stat))));
                }
            }
            rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (tag, weight) in rows {
                let stat = stats.get(&tag).cloned().unwrap_or_default();
                let style = if stat.wrong > 0 {
                    self.theme.wrong()
                } else {
                    Style::default().fg(self.theme.colors.text)
                };
                lines.push(Line::from(Span::styled(
                    format!(
                        "  {:<24}{:>6}{:>7}{:>8.2}",
                        truncate(&tag, 23),
                        stat.seen,
                        stat.wrong,
                        weight
                    ),
                    style,
                )));
            }
        }
        if lines.is_empty() {
            lines.push(Line::from(Span::styled(
                "No quiz history yet. Finish a quiz card to see tag statistics.",
                self.theme.dim(),
            )));
        }

        let tags = Paragraph::new(lines)
            .scroll((self.progress_scroll, 0))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(self.theme.colors.accent))
                    .title(" Tags by weight ")
                    .title_style(Style::default().fg(self.theme.colors.accent)),
            );
        frame.render_widget(tags, chunks[3]);
    }

    fn render_settings(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::vertical([
            Constraint::Length(3),   // Title
            Constraint::Min(7),      // Settings
        ])
        .split(centered_rect(60, 100, area));

        let title = Paragraph::new("Settings 设置")
            .alignment(Alignment::Center)
            .style(self.theme.title());
        frame.render_widget(title, chunks[0]);

        let on_off = |b: bool| if b { "on" } else { "off" };
        let mut online = on_off(self.config.online_lookup).to_string();
        if self.offline {
            online.push_str(" (--offline)");
        }
        let rows = [
            ("Theme 主题", ThemeName::from_str(&self.config.theme).display_name().to_string()),
            ("Show Chinese 显示中文", on_off(self.config.show_chinese).to_string()),
            ("Quiz size 每轮题数", self.config.quiz_size.to_string()),
            ("Online lookup 在线查词", online),
            ("Cache days 缓存天数", self.config.cache_ttl_days.to_string()),
        ];
        let items: Vec<ListItem> = rows
            .into_iter()
            .map(|(name, value)| {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{:<28}", name), Style::default().fg(self.theme.colors.text)),
                    Span::styled(format!("‹ {} ›", value), self.theme.highlight()),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(self.theme.colors.primary)),
            )
            .highlight_style(self.theme.selected())
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, chunks[1], &mut self.settings_state);
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Helper Functions
// ══════════════════════════════════════════════════════════════════════════

fn next_field(field: QuizField, forward: bool) -> QuizField {
    match (field, forward) {
        (QuizField::Task, true) | (QuizField::Output, false) => QuizField::Notice,
        (QuizField::Notice, true) | (QuizField::Task, false) => QuizField::Output,
        (QuizField::Output, true) | (QuizField::Notice, false) => QuizField::Task,
    }
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);

    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FileSource;
    use crate::dictionary::OfflineDictionary;
    use tempfile::TempDir;

    fn test_app(dir: &TempDir) -> App {
        let store = ProgressStore::new(dir.path().join("progress.json")).unwrap();
        let library = DataLibrary::new(Box::new(FileSource::new(None)));
        let config = Config {
            online_lookup: false,
            ..Config::default()
        };
        App::new(config, store, Progress::default(), library, Arc::new(OfflineDictionary), true)
    }

    #[test]
    fn test_field_cycle() {
        let mut field = QuizField::Task;
        for _ in 0..3 {
            field = next_field(field, true);
        }
        assert_eq!(field, QuizField::Task);
        assert_eq!(next_field(QuizField::Task, false), QuizField::Output);
    }

    #[test]
    fn test_card_navigation_wraps() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.open_subject(Subject::Math);
        let count = app.card_count();
        assert!(count > 1);

        app.move_card(false);
        assert_eq!(app.current_card_index(), count - 1);
        app.move_card(true);
        assert_eq!(app.current_card_index(), 0);
    }

    #[test]
    fn test_save_focused_unit() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.open_subject(Subject::Math);
        let term = app.focused_unit().unwrap();

        app.handle_read_keys(KeyCode::Char('w'));
        assert_eq!(app.progress.word_bank.len(), 1);
        assert_eq!(app.progress.word_bank[0].term, term);
        assert_eq!(app.progress.word_bank[0].subject, Some(Subject::Math));

        let saved = ProgressStore::new(dir.path().join("progress.json")).unwrap().load().unwrap();
        assert_eq!(saved.word_bank.len(), 1);
    }

    #[test]
    fn test_gloss_uses_word_list_when_offline() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.open_subject(Subject::Math);
        app.open_gloss("Area");
        let gloss = app.gloss.as_ref().unwrap();
        assert!(!gloss.loading);
        assert_eq!(gloss.zh, "面积");
    }

    #[test]
    fn test_gloss_with_oversized_cache_ttl() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.config.cache_ttl_days = i64::MAX;
        app.progress.lookup_cache.insert(LookupResult::empty("area"));
        app.open_subject(Subject::Math);
        app.open_gloss("Area");
        assert!(app.gloss.is_some());
    }

    #[test]
    fn test_quiz_answer_records_stats() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.open_subject(Subject::Math);
        app.handle_read_keys(KeyCode::Char('2'));
        assert_eq!(app.screen, Screen::Quiz);
        assert!(app.quiz.is_some());

        app.handle_quiz_keys(KeyCode::Char('s'));
        assert!(!app.progress.stats(Subject::Math).is_empty());
        assert!(app.progress.stats(Subject::Math).values().all(|s| s.wrong == s.seen));

        app.handle_quiz_keys(KeyCode::Enter);
        assert_eq!(app.quiz.as_ref().unwrap().current, 1);
    }

    #[test]
    fn test_empty_subject_cannot_quiz() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.open_subject(Subject::Chinese);
        app.start_quiz();
        assert!(app.quiz.is_none());
        assert!(app.quiz_error.is_some());
    }

    #[test]
    fn test_wordbook_delete_needs_confirmation() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        let now = Local::now();
        app.progress.add_word("area", "面积", None, None, now);
        app.progress.add_word("volume", "体积", None, None, now);
        app.reset_bank_selection();
        app.screen = Screen::Wordbook;

        app.handle_wordbook_keys(KeyCode::Char('d'));
        assert_eq!(app.progress.word_bank.len(), 2);
        app.handle_wordbook_keys(KeyCode::Char('j'));
        assert!(!app.delete_pending);

        app.handle_wordbook_keys(KeyCode::Char('d'));
        app.handle_wordbook_keys(KeyCode::Char('d'));
        assert_eq!(app.progress.word_bank.len(), 1);
        assert_eq!(app.progress.word_bank[0].term, "volume");
    }
}
