//! Weighted quiz selection, option building and exact-match scoring.
//!
//! Tags the learner gets wrong, or has rarely seen, are drawn more often:
//!
//! ```text
//! weight = 1 + 2 * wrong_rate + 0.5 * max(0, 3 - seen) / 3
//! ```
//!
//! Tags without history weigh 1.0. A card is drawn by first spinning a
//! roulette over tag weights, then choosing uniformly among unused cards with
//! that tag.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::dataset::SubjectData;
use crate::models::{AnswerKey, InstructionCard, Subject, TagStat, TagStats};

/// Failed tag draws tolerated before falling back to uniform picks.
pub const RETRY_GUARD: usize = 5000;
/// Options shown for task-type and notice fields.
pub const MULTI_OPTION_COUNT: usize = 6;
/// Options shown for the output field.
pub const SINGLE_OPTION_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizField {
    Task,
    Notice,
    Output,
}

impl fmt::Display for QuizField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Task => "task type",
            Self::Notice => "notice",
            Self::Output => "output",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("no cards with a complete answer key")]
    NoCards,

    #[error("quiz size must be at least one card")]
    ZeroSize,

    #[error("only {available} {field} options available, {needed} needed")]
    NotEnoughOptions {
        field: QuizField,
        available: usize,
        needed: usize,
    },
}

// ══════════════════════════════════════════════════════════════════════════
// Weighted Selection
// ══════════════════════════════════════════════════════════════════════════

/// Draw weight for a tag given its history.
pub fn tag_weight(stat: Option<&TagStat>) -> f64 {
    match stat {
        None => 1.0,
        Some(stat) => {
            let exposure = 3.0 - f64::from(stat.seen.min(3));
            1.0 + 2.0 * stat.wrong_rate() + 0.5 * exposure / 3.0
        }
    }
}

/// Weight of every tag present in `pool`, in tag order.
pub fn pool_weights(pool: &[&InstructionCard], stats: &TagStats) -> Vec<(String, f64)> {
    let tags: BTreeSet<&str> = pool
        .iter()
        .flat_map(|c| c.tags.iter().map(String::as_str))
        .collect();
    tags.into_iter()
        .map(|t| (t.to_string(), tag_weight(stats.get(t))))
        .collect()
}

/// Pick up to `count` distinct card indices from `pool`, biased toward weak tags.
pub fn select_weighted<R: Rng + ?Sized>(
    pool: &[&InstructionCard],
    stats: &TagStats,
    count: usize,
    rng: &mut R,
) -> Vec<usize> {
    let target = count.min(pool.len());

    let mut by_tag: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, card) in pool.iter().enumerate() {
        let tags: BTreeSet<&str> = card.tags.iter().map(String::as_str).collect();
        for tag in tags {
            by_tag.entry(tag).or_default().push(i);
        }
    }
    let wheel: Vec<(f64, &[usize])> = by_tag
        .iter()
        .map(|(tag, cards)| (tag_weight(stats.get(*tag)), cards.as_slice()))
        .collect();
    let total: f64 = wheel.iter().map(|(w, _)| w).sum();

    let mut used = vec![false; pool.len()];
    let mut chosen = Vec::with_capacity(target);
    let mut failures = 0;

    while chosen.len() < target && failures < RETRY_GUARD && !wheel.is_empty() {
        let cards = spin(&wheel, total, rng);
        let candidates: Vec<usize> = cards.iter().copied().filter(|&i| !used[i]).collect();
        if candidates.is_empty() {
            failures += 1;
            continue;
        }
        let pick = candidates[rng.random_range(0..candidates.len())];
        used[pick] = true;
        chosen.push(pick);
    }

    if chosen.len() < target {
        debug!(
            "tag draw stalled after {} failures, filling {} slots uniformly",
            failures,
            target - chosen.len()
        );
    }
    while chosen.len() < target {
        let remaining: Vec<usize> = (0..pool.len()).filter(|&i| !used[i]).collect();
        let pick = remaining[rng.random_range(0..remaining.len())];
        used[pick] = true;
        chosen.push(pick);
    }

    chosen
}

fn spin<'w, R: Rng + ?Sized>(wheel: &[(f64, &'w [usize])], total: f64, rng: &mut R) -> &'w [usize] {
    let mut ball = rng.random::<f64>() * total;
    for &(weight, cards) in wheel {
        if ball < weight {
            return cards;
        }
        ball -= weight;
    }
    wheel.last().map_or(&[][..], |&(_, cards)| cards)
}

// ══════════════════════════════════════════════════════════════════════════
// Options & Scoring
// ══════════════════════════════════════════════════════════════════════════

/// The correct answers plus distractors from `bank`, shuffled, with no duplicates.
pub fn build_options<R: Rng + ?Sized>(
    correct: &[String],
    bank: &[String],
    target: usize,
    field: QuizField,
    rng: &mut R,
) -> Result<Vec<String>, QuizError> {
    let mut options: Vec<String> = Vec::with_capacity(target);
    for answer in correct {
        if !options.contains(answer) {
            options.push(answer.clone());
        }
    }

    let mut distractors: Vec<&String> = bank.iter().filter(|b| !options.contains(b)).collect();
    distractors.sort();
    distractors.dedup();
    distractors.shuffle(rng);

    for d in distractors {
        if options.len() >= target {
            break;
        }
        options.push(d.clone());
    }

    if options.len() < target {
        return Err(QuizError::NotEnoughOptions {
            field,
            available: options.len(),
            needed: target,
        });
    }

    options.shuffle(rng);
    Ok(options)
}

/// The learner's answer to one card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub task: BTreeSet<String>,
    pub notice: BTreeSet<String>,
    pub output: Option<String>,
}

impl Selection {
    pub fn toggle(&mut self, field: QuizField, option: &str) {
        let set = match field {
            QuizField::Task => &mut self.task,
            QuizField::Notice => &mut self.notice,
            QuizField::Output => {
                self.output = Some(option.to_string());
                return;
            }
        };
        if !set.remove(option) {
            set.insert(option.to_string());
        }
    }

    pub fn is_selected(&self, field: QuizField, option: &str) -> bool {
        match field {
            QuizField::Task => self.task.contains(option),
            QuizField::Notice => self.notice.contains(option),
            QuizField::Output => self.output.as_deref() == Some(option),
        }
    }
}

/// Which of the three fields matched exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldScores {
    pub task: bool,
    pub notice: bool,
    pub output: bool,
}

impl FieldScores {
    pub fn points(&self) -> u32 {
        u32::from(self.task) + u32::from(self.notice) + u32::from(self.output)
    }

    pub fn is_correct(&self) -> bool {
        self.task && self.notice && self.output
    }

    pub fn get(&self, field: QuizField) -> bool {
        match field {
            QuizField::Task => self.task,
            QuizField::Notice => self.notice,
            QuizField::Output => self.output,
        }
    }
}

/// Exact set equality only; subsets and supersets score nothing.
pub fn set_matches(expected: &[String], selected: &BTreeSet<String>) -> bool {
    let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    expected.len() == selected.len() && selected.iter().all(|s| expected.contains(s.as_str()))
}

pub fn score(key: &AnswerKey, selection: &Selection) -> FieldScores {
    FieldScores {
        task: set_matches(&key.task, &selection.task),
        notice: set_matches(&key.notice, &selection.notice),
        output: selection.output.as_deref() == Some(key.output.as_str()),
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Quiz Session
// ══════════════════════════════════════════════════════════════════════════

/// One card prepared for quizzing.
#[derive(Debug, Clone)]
pub struct QuizItem {
    pub card: InstructionCard,
    pub key: AnswerKey,
    pub task_options: Vec<String>,
    pub notice_options: Vec<String>,
    pub output_options: Vec<String>,
}

impl QuizItem {
    pub fn options(&self, field: QuizField) -> &[String] {
        match field {
            QuizField::Task => &self.task_options,
            QuizField::Notice => &self.notice_options,
            QuizField::Output => &self.output_options,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardResult {
    pub scores: FieldScores,
    pub skipped: bool,
}

impl CardResult {
    pub fn is_correct(&self) -> bool {
        !self.skipped && self.scores.is_correct()
    }
}

/// A finished card, ready to be folded into tag statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub tags: Vec<String>,
    pub correct: bool,
}

/// A run of weighted quiz items for one subject.
#[derive(Debug, Clone)]
pub struct QuizSession {
    pub subject: Subject,
    pub items: Vec<QuizItem>,
    pub current: usize,
    pub selection: Selection,
    pub results: Vec<Option<CardResult>>,
}

impl QuizSession {
    pub fn new<R: Rng + ?Sized>(
        data: &SubjectData,
        stats: &TagStats,
        size: usize,
        rng: &mut R,
    ) -> Result<Self, QuizError> {
        if size == 0 {
            return Err(QuizError::ZeroSize);
        }
        let pool = data.quiz_pool();
        if pool.is_empty() {
            return Err(QuizError::NoCards);
        }

        let patterns = &data.patterns;
        let mut items = Vec::new();
        for i in select_weighted(&pool, stats, size, rng) {
            let card = pool[i];
            let Some(key) = card.answer_key() else {
                continue;
            };
            let task_options = build_options(
                &key.task,
                &patterns.task_types,
                MULTI_OPTION_COUNT,
                QuizField::Task,
                rng,
            )?;
            let notice_options = build_options(
                &key.notice,
                &patterns.notices,
                MULTI_OPTION_COUNT,
                QuizField::Notice,
                rng,
            )?;
            let output_options = build_options(
                std::slice::from_ref(&key.output),
                &patterns.outputs,
                SINGLE_OPTION_COUNT,
                QuizField::Output,
                rng,
            )?;
            items.push(QuizItem {
                card: card.clone(),
                key: key.clone(),
                task_options,
                notice_options,
                output_options,
            });
        }

        debug!("quiz for {} with {} items", data.subject.key(), items.len());
        let results = vec![None; items.len()];
        Ok(Self {
            subject: data.subject,
            items,
            current: 0,
            selection: Selection::default(),
            results,
        })
    }

    pub fn current_item(&self) -> Option<&QuizItem> {
        self.items.get(self.current)
    }

    pub fn current_result(&self) -> Option<CardResult> {
        self.results.get(self.current).copied().flatten()
    }

    /// Change a selection while the current card is still open.
    pub fn toggle(&mut self, field: QuizField, option: &str) {
        if self.current_result().is_none() {
            self.selection.toggle(field, option);
        }
    }

    /// Score the current selection. Returns `None` if already answered.
    pub fn submit(&mut self) -> Option<Outcome> {
        let scores = score(&self.current_item()?.key, &self.selection);
        self.finish_current(CardResult {
            scores,
            skipped: false,
        })
    }

    /// Give up on the current card; it counts as wrong.
    pub fn skip(&mut self) -> Option<Outcome> {
        self.finish_current(CardResult {
            scores: FieldScores::default(),
            skipped: true,
        })
    }

    fn finish_current(&mut self, result: CardResult) -> Option<Outcome> {
        if self.current_result().is_some() {
            return None;
        }
        let tags = self.current_item()?.card.tags.clone();
        self.results[self.current] = Some(result);
        Some(Outcome {
            tags,
            correct: result.is_correct(),
        })
    }

    /// Move to the next card once the current one is finished.
    pub fn advance(&mut self) -> bool {
        if self.current_result().is_none() || self.current >= self.items.len() {
            return false;
        }
        self.current += 1;
        self.selection = Selection::default();
        true
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.items.len()
    }

    pub fn answered(&self) -> usize {
        self.results.iter().flatten().count()
    }

    pub fn points(&self) -> u32 {
        self.results.iter().flatten().map(|r| r.scores.points()).sum()
    }

    pub fn correct_cards(&self) -> usize {
        self.results.iter().flatten().filter(|r| r.is_correct()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatternBank;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn card(en: &str, tags: &[&str]) -> InstructionCard {
        let mut card = InstructionCard::new(en, "");
        card.tags = tags.iter().map(|t| t.to_string()).collect();
        card.quiz = Some(AnswerKey {
            task: vec!["calculate".into()],
            notice: vec!["units".into(), "rounding".into()],
            output: "number".into(),
        });
        card
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn stat(seen: u32, wrong: u32) -> TagStat {
        TagStat {
            seen,
            wrong,
            last_seen: None,
        }
    }

    fn subject_data(cards: Vec<InstructionCard>) -> SubjectData {
        let patterns = PatternBank {
            task_types: strings(&["calculate", "compare", "measure", "estimate", "draw", "explain"]),
            notices: strings(&["units", "rounding", "remainder", "each", "order", "working"]),
            outputs: strings(&["number", "sentence", "drawing", "table", "fraction"]),
            labels: BTreeMap::new(),
        };
        SubjectData::new(Subject::Math, cards, Vec::new(), patterns)
    }

    #[test]
    fn test_weight_at_least_one() {
        assert_eq!(tag_weight(None), 1.0);
        for seen in 0..8 {
            for wrong in 0..=seen {
                assert!(tag_weight(Some(&stat(seen, wrong))) >= 1.0);
            }
        }
    }

    #[test]
    fn test_weight_favours_weak_tags() {
        let weak = tag_weight(Some(&stat(1, 1)));
        let strong = tag_weight(Some(&stat(10, 0)));
        assert!(weak > strong);
        assert!((weak - (1.0 + 2.0 + 0.5 * 2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(strong, 1.0);
        // Exposure bonus fades out at three views.
        assert!(tag_weight(Some(&stat(2, 0))) > tag_weight(Some(&stat(3, 0))));
        assert_eq!(tag_weight(Some(&stat(3, 0))), 1.0);
    }

    #[test]
    fn test_pool_weights_cover_every_tag() {
        let cards = vec![card("a", &["area", "units"]), card("b", &["money"])];
        let pool: Vec<&InstructionCard> = cards.iter().collect();
        let mut stats = TagStats::new();
        stats.insert("money".into(), stat(1, 1));
        let weights = pool_weights(&pool, &stats);
        let tags: Vec<&str> = weights.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tags, vec!["area", "money", "units"]);
        assert!(weights[1].1 > weights[0].1);
    }

    #[test]
    fn test_selection_is_distinct_and_bounded() {
        let cards: Vec<InstructionCard> = (0..12)
            .map(|i| card(&format!("card {i}"), &[["area", "money", "time"][i % 3]]))
            .collect();
        let pool: Vec<&InstructionCard> = cards.iter().collect();
        let mut rng = StdRng::seed_from_u64(7);

        for count in [0, 1, 5, 12, 30] {
            let picked = select_weighted(&pool, &TagStats::new(), count, &mut rng);
            assert_eq!(picked.len(), count.min(pool.len()));
            let unique: BTreeSet<usize> = picked.iter().copied().collect();
            assert_eq!(unique.len(), picked.len());
        }
    }

    #[test]
    fn test_dominant_tag_still_fills_request() {
        let mut cards = vec![card("weak", &["weak"])];
        cards.extend((0..9).map(|i| card(&format!("untagged {i}"), &[])));
        let pool: Vec<&InstructionCard> = cards.iter().collect();
        let mut stats = TagStats::new();
        stats.insert("weak".into(), stat(1, 1));

        let mut rng = StdRng::seed_from_u64(42);
        let picked = select_weighted(&pool, &stats, 10, &mut rng);
        assert_eq!(picked.len(), 10);
        let unique: BTreeSet<usize> = picked.iter().copied().collect();
        assert_eq!(unique.len(), 10);
        assert_eq!(picked[0], 0);
    }

    #[test]
    fn test_weak_tag_drawn_more_often() {
        let cards: Vec<InstructionCard> = (0..20)
            .map(|i| card(&format!("card {i}"), &[if i < 10 { "weak" } else { "strong" }]))
            .collect();
        let pool: Vec<&InstructionCard> = cards.iter().collect();
        let mut stats = TagStats::new();
        stats.insert("weak".into(), stat(4, 4));
        stats.insert("strong".into(), stat(20, 0));

        let mut rng = StdRng::seed_from_u64(3);
        let mut weak_first = 0;
        for _ in 0..500 {
            let picked = select_weighted(&pool, &stats, 1, &mut rng);
            if picked[0] < 10 {
                weak_first += 1;
            }
        }
        // Weights 3.0 vs 1.0 put the expectation at 375.
        assert!(weak_first > 300, "weak tag drawn {weak_first} times");
    }

    #[test]
    fn test_options_contain_answers_once() {
        let mut rng = StdRng::seed_from_u64(11);
        let correct = strings(&["units", "rounding"]);
        let bank = strings(&["units", "rounding", "remainder", "each", "order", "working", "units"]);
        for _ in 0..50 {
            let options =
                build_options(&correct, &bank, MULTI_OPTION_COUNT, QuizField::Notice, &mut rng)
                    .unwrap();
            assert_eq!(options.len(), MULTI_OPTION_COUNT);
            let unique: BTreeSet<&String> = options.iter().collect();
            assert_eq!(unique.len(), options.len());
            for answer in &correct {
                assert_eq!(options.iter().filter(|o| *o == answer).count(), 1);
            }
        }
    }

    #[test]
    fn test_options_report_small_bank() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = build_options(
            &strings(&["number"]),
            &strings(&["number", "sentence"]),
            SINGLE_OPTION_COUNT,
            QuizField::Output,
            &mut rng,
        );
        assert_eq!(
            result,
            Err(QuizError::NotEnoughOptions {
                field: QuizField::Output,
                available: 2,
                needed: SINGLE_OPTION_COUNT,
            })
        );
    }

    #[test]
    fn test_exact_set_scoring() {
        let expected = strings(&["A", "B"]);
        let pick = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
        assert!(set_matches(&expected, &pick(&["A", "B"])));
        assert!(!set_matches(&expected, &pick(&["A"])));
        assert!(!set_matches(&expected, &pick(&["A", "B", "C"])));
        assert!(!set_matches(&expected, &pick(&[])));
    }

    #[test]
    fn test_score_requires_all_fields() {
        let key = card("x", &[]).quiz.unwrap();
        let mut selection = Selection::default();
        selection.toggle(QuizField::Task, "calculate");
        selection.toggle(QuizField::Notice, "units");
        selection.toggle(QuizField::Notice, "rounding");
        selection.toggle(QuizField::Output, "sentence");
        let scores = score(&key, &selection);
        assert_eq!(scores.points(), 2);
        assert!(!scores.is_correct());

        selection.toggle(QuizField::Output, "number");
        assert!(score(&key, &selection).is_correct());

        selection.toggle(QuizField::Notice, "units");
        let scores = score(&key, &selection);
        assert!(!scores.notice);
        assert_eq!(scores.points(), 2);
    }

    #[test]
    fn test_session_flow() {
        let data = subject_data(vec![card("one", &["area"]), card("two", &["money"])]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut session = QuizSession::new(&data, &TagStats::new(), 10, &mut rng).unwrap();
        assert_eq!(session.items.len(), 2);
        for item in &session.items {
            assert_eq!(item.task_options.len(), MULTI_OPTION_COUNT);
            assert_eq!(item.notice_options.len(), MULTI_OPTION_COUNT);
            assert_eq!(item.output_options.len(), SINGLE_OPTION_COUNT);
        }

        assert!(!session.advance());
        session.toggle(QuizField::Task, "calculate");
        session.toggle(QuizField::Notice, "units");
        session.toggle(QuizField::Notice, "rounding");
        session.toggle(QuizField::Output, "number");
        let first_tags = session.current_item().unwrap().card.tags.clone();
        let outcome = session.submit().unwrap();
        assert!(outcome.correct);
        assert_eq!(outcome.tags, first_tags);
        assert!(session.submit().is_none());

        assert!(session.advance());
        assert_eq!(session.selection, Selection::default());
        let outcome = session.skip().unwrap();
        assert!(!outcome.correct);
        assert!(session.advance());

        assert!(session.is_finished());
        assert_eq!(session.answered(), 2);
        assert_eq!(session.points(), 3);
        assert_eq!(session.correct_cards(), 1);
    }

    #[test]
    fn test_session_needs_answer_keys() {
        let mut plain = InstructionCard::new("Read this.", "");
        plain.tags = vec!["reading".into()];
        let data = subject_data(vec![plain]);
        let mut rng = StdRng::seed_from_u64(0);
        let result = QuizSession::new(&data, &TagStats::new(), 5, &mut rng);
        assert_eq!(result.err(), Some(QuizError::NoCards));
    }

    #[test]
    fn test_session_rejects_zero_size() {
        let data = subject_data(vec![card("one", &["area"])]);
        let mut rng = StdRng::seed_from_u64(0);
        let result = QuizSession::new(&data, &TagStats::new(), 0, &mut rng);
        assert_eq!(result.err(), Some(QuizError::ZeroSize));
    }

    #[test]
    fn test_empty_notice_key_scores_empty_selection() {
        let mut only = card("one", &["area"]);
        if let Some(key) = only.quiz.as_mut() {
            key.notice.clear();
        }
        let data = subject_data(vec![only]);
        let mut rng = StdRng::seed_from_u64(0);
        let session = QuizSession::new(&data, &TagStats::new(), 1, &mut rng).unwrap();
        assert_eq!(session.items.len(), 1);

        let key = session.items[0].card.answer_key().unwrap();
        let selection = Selection {
            task: key.task.iter().cloned().collect(),
            notice: BTreeSet::new(),
            output: Some(key.output.clone()),
        };
        assert!(score(key, &selection).is_correct());
    }

    #[test]
    fn test_session_reports_thin_pattern_bank() {
        let mut data = subject_data(vec![card("one", &["area"])]);
        data.patterns.outputs = strings(&["number"]);
        let mut rng = StdRng::seed_from_u64(0);
        let result = QuizSession::new(&data, &TagStats::new(), 5, &mut rng);
        assert!(matches!(
            result.err(),
            Some(QuizError::NotEnoughOptions { field: QuizField::Output, .. })
        ));
    }
}
