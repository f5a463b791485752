//! Clickable-term annotation for instruction text.
//!
//! Text is split into plain runs, single-word lookup units and known
//! multi-word phrases. Phrase occurrences are claimed first, longest phrase
//! first, as non-overlapping intervals; word units are then tokenized only in
//! the gaps between claimed intervals, so a word inside a phrase can never be
//! wrapped twice.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::models::WordEntry;

/// Upper bound on phrases tried per annotation pass.
pub const MAX_PHRASES: usize = 500;

/// Multi-word lookup phrases for one subject, longest first.
#[derive(Debug, Clone, Default)]
pub struct PhraseIndex {
    phrases: Vec<Vec<char>>,
}

impl PhraseIndex {
    /// Collect lemmas and collocations that span at least two tokens.
    pub fn build(words: &[WordEntry]) -> Self {
        let mut unique = BTreeSet::new();
        for word in words {
            let candidates = std::iter::once(&word.term).chain(word.collocations.iter());
            for candidate in candidates {
                let tokens: Vec<String> = candidate
                    .split_whitespace()
                    .map(|t| t.to_lowercase())
                    .collect();
                if tokens.len() >= 2 {
                    unique.insert(tokens.join(" "));
                }
            }
        }

        let mut phrases: Vec<String> = unique.into_iter().collect();
        // BTreeSet order keeps ties stable.
        phrases.sort_by_key(|p| Reverse(p.chars().count()));

        Self {
            phrases: phrases.iter().map(|p| p.chars().collect()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    #[cfg(test)]
    pub fn phrases(&self) -> impl Iterator<Item = String> + '_ {
        self.phrases.iter().map(|p| p.iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Plain,
    Word,
    Phrase,
}

/// A contiguous slice of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub text: &'a str,
}

impl Segment<'_> {
    pub fn is_unit(&self) -> bool {
        self.kind != SegmentKind::Plain
    }
}

/// Annotated text: concatenating every segment reproduces the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation<'a> {
    pub segments: Vec<Segment<'a>>,
}

impl<'a> Annotation<'a> {
    /// Lookup units in reading order.
    pub fn units(&self) -> impl Iterator<Item = &Segment<'a>> {
        self.segments.iter().filter(|s| s.is_unit())
    }

    pub fn unit_count(&self) -> usize {
        self.units().count()
    }

    pub fn unit(&self, n: usize) -> Option<&Segment<'a>> {
        self.units().nth(n)
    }

    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        self.segments.iter().map(|s| s.text).collect()
    }

    /// Render as markup with every unit in a `kw` span.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            let safe = escape_html(segment.text);
            match segment.kind {
                SegmentKind::Plain => out.push_str(&safe),
                SegmentKind::Word => {
                    out.push_str(&format!(r#"<span class="kw" data-term="{safe}">{safe}</span>"#));
                }
                SegmentKind::Phrase => {
                    out.push_str(&format!(
                        r#"<span class="kw" data-term="{safe}" data-phrase="1">{safe}</span>"#
                    ));
                }
            }
        }
        out
    }
}

/// Split `text` into plain runs, word units and phrase units.
pub fn annotate<'a>(text: &'a str, index: &PhraseIndex) -> Annotation<'a> {
    if text.is_empty() {
        return Annotation::default();
    }

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map_or(text.len(), |(b, _)| *b);

    let mut claimed: Vec<(usize, usize)> = Vec::new();
    if !index.is_empty() {
        for phrase in index.phrases.iter().take(MAX_PHRASES) {
            claim_phrase(&chars, phrase, &mut claimed);
        }
        claimed.sort_unstable();
    }

    let mut segments = Vec::new();
    let mut pos = 0;
    for &(start, end) in &claimed {
        push_words(text, &chars, pos, start, &mut segments);
        segments.push(Segment {
            kind: SegmentKind::Phrase,
            text: &text[byte_at(start)..byte_at(end)],
        });
        pos = end;
    }
    push_words(text, &chars, pos, chars.len(), &mut segments);

    Annotation { segments }
}

/// Escape characters that are significant in markup or attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn is_boundary_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn chars_match(text: char, phrase: char) -> bool {
    if phrase == ' ' {
        return text.is_whitespace();
    }
    text == phrase || text.to_lowercase().eq(phrase.to_lowercase())
}

/// Claim every free whole-word occurrence of `phrase`, scanning left to right.
fn claim_phrase(chars: &[(usize, char)], phrase: &[char], claimed: &mut Vec<(usize, usize)>) {
    let (Some(&first), Some(&last)) = (phrase.first(), phrase.last()) else {
        return;
    };
    let len = phrase.len();
    if len > chars.len() {
        return;
    }

    let mut i = 0;
    while i + len <= chars.len() {
        let end = i + len;
        let matched = chars[i..end]
            .iter()
            .zip(phrase)
            .all(|(&(_, t), &p)| chars_match(t, p));
        let left_ok = !is_boundary_char(first) || i == 0 || !is_boundary_char(chars[i - 1].1);
        let right_ok =
            !is_boundary_char(last) || end == chars.len() || !is_boundary_char(chars[end].1);
        let free = claimed.iter().all(|&(s, e)| end <= s || i >= e);

        if matched && left_ok && right_ok && free {
            claimed.push((i, end));
            i = end;
        } else {
            i += 1;
        }
    }
}

/// Tokenize `chars[from..to]` into plain runs and `[A-Za-z][A-Za-z']*` words.
fn push_words<'a>(
    text: &'a str,
    chars: &[(usize, char)],
    from: usize,
    to: usize,
    segments: &mut Vec<Segment<'a>>,
) {
    let byte_at = |i: usize| chars.get(i).map_or(text.len(), |(b, _)| *b);

    let mut plain_start = from;
    let mut i = from;
    while i < to {
        if !chars[i].1.is_ascii_alphabetic() {
            i += 1;
            continue;
        }

        let word_start = i;
        while i < to && (chars[i].1.is_ascii_alphabetic() || chars[i].1 == '\'') {
            i += 1;
        }
        if plain_start < word_start {
            segments.push(Segment {
                kind: SegmentKind::Plain,
                text: &text[byte_at(plain_start)..byte_at(word_start)],
            });
        }
        segments.push(Segment {
            kind: SegmentKind::Word,
            text: &text[byte_at(word_start)..byte_at(i)],
        });
        plain_start = i;
    }

    if plain_start < to {
        segments.push(Segment {
            kind: SegmentKind::Plain,
            text: &text[byte_at(plain_start)..byte_at(to)],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(term: &str, collocations: &[&str]) -> WordEntry {
        let mut entry = WordEntry::new(term, "");
        entry.collocations = collocations.iter().map(|c| c.to_string()).collect();
        entry
    }

    fn kinds<'a>(annotation: &Annotation<'a>) -> Vec<(SegmentKind, &'a str)> {
        annotation.segments.iter().map(|s| (s.kind, s.text)).collect()
    }

    #[test]
    fn test_phrase_index_keeps_multi_token_longest_first() {
        let words = vec![
            word("kilometre", &["Square Kilometre", "per  kilometre"]),
            word("line of symmetry", &["line of symmetry"]),
            word("area", &[]),
        ];
        let index = PhraseIndex::build(&words);
        let phrases: Vec<String> = index.phrases().collect();
        assert_eq!(
            phrases,
            vec!["line of symmetry", "square kilometre", "per kilometre"]
        );
    }

    #[test]
    fn test_plain_text_roundtrip_without_terms() {
        let index = PhraseIndex::default();
        let text = "Draw 3 lines, then — carefully — label them (in cm).";
        let annotation = annotate(text, &index);
        assert_eq!(annotation.plain_text(), text);
        assert!(annotation.units().all(|s| s.kind == SegmentKind::Word));
    }

    #[test]
    fn test_chinese_text_has_no_units() {
        let annotation = annotate("计算长方形的面积。", &PhraseIndex::default());
        assert_eq!(annotation.unit_count(), 0);
        assert_eq!(annotation.plain_text(), "计算长方形的面积。");
    }

    #[test]
    fn test_empty_text() {
        let annotation = annotate("", &PhraseIndex::default());
        assert!(annotation.segments.is_empty());
        assert_eq!(annotation.to_html(), "");
    }

    #[test]
    fn test_longest_match_wins() {
        let words = vec![word("kilometre", &[]), word("square kilometre", &[])];
        let index = PhraseIndex::build(&words);
        let annotation = annotate("a square kilometre", &index);
        assert_eq!(
            kinds(&annotation),
            vec![
                (SegmentKind::Word, "a"),
                (SegmentKind::Plain, " "),
                (SegmentKind::Phrase, "square kilometre"),
            ]
        );
    }

    #[test]
    fn test_contained_phrase_not_double_wrapped() {
        let words = vec![word("area", &["surface area", "total surface area"])];
        let index = PhraseIndex::build(&words);
        let annotation = annotate("Find the total surface area.", &index);
        let phrases: Vec<&str> = annotation
            .units()
            .filter(|s| s.kind == SegmentKind::Phrase)
            .map(|s| s.text)
            .collect();
        assert_eq!(phrases, vec!["total surface area"]);
        assert!(annotation
            .units()
            .all(|s| s.kind == SegmentKind::Phrase || !["surface", "area", "total"].contains(&s.text)));
    }

    #[test]
    fn test_case_insensitive_preserves_casing() {
        let index = PhraseIndex::build(&[word("line graph", &[])]);
        let annotation = annotate("Study the Line Graph below.", &index);
        let phrase = annotation
            .units()
            .find(|s| s.kind == SegmentKind::Phrase)
            .map(|s| s.text);
        assert_eq!(phrase, Some("Line Graph"));
    }

    #[test]
    fn test_word_boundaries_required() {
        let index = PhraseIndex::build(&[word("per cent", &[])]);
        let annotation = annotate("super centre", &index);
        assert!(annotation.units().all(|s| s.kind == SegmentKind::Word));

        let annotation = annotate("per centage", &index);
        assert!(annotation.units().all(|s| s.kind == SegmentKind::Word));
    }

    #[test]
    fn test_possessive_after_phrase_splits_cleanly() {
        let index = PhraseIndex::build(&[word("food chain", &[])]);
        let annotation = annotate("the food chain's top", &index);
        assert_eq!(
            kinds(&annotation),
            vec![
                (SegmentKind::Word, "the"),
                (SegmentKind::Plain, " "),
                (SegmentKind::Phrase, "food chain"),
                (SegmentKind::Plain, "'"),
                (SegmentKind::Word, "s"),
                (SegmentKind::Plain, " "),
                (SegmentKind::Word, "top"),
            ]
        );
        assert_eq!(annotation.plain_text(), "the food chain's top");
    }

    #[test]
    fn test_apostrophes_inside_words() {
        let annotation = annotate("Don't stop", &PhraseIndex::default());
        let units: Vec<&str> = annotation.units().map(|s| s.text).collect();
        assert_eq!(units, vec!["Don't", "stop"]);
    }

    #[test]
    fn test_html_escapes_everything() {
        let index = PhraseIndex::build(&[word("a < b", &[])]);
        let html = annotate("<b>x</b> & a < b", &index).to_html();
        assert!(!html.contains("<b>"));
        assert!(html.starts_with("&lt;"));
        assert!(html.contains(r#"<span class="kw" data-term="a &lt; b" data-phrase="1">a &lt; b</span>"#));
        assert!(html.contains(r#"<span class="kw" data-term="x">x</span>"#));
        assert!(html.contains("&amp;"));
    }

    #[test]
    fn test_phrase_spans_line_break() {
        let index = PhraseIndex::build(&[word("bar graph", &[])]);
        let annotation = annotate("Draw a bar\ngraph.", &index);
        assert_eq!(
            annotation.units().last().map(|s| (s.kind, s.text)),
            Some((SegmentKind::Phrase, "bar\ngraph"))
        );
    }

    #[test]
    fn test_phrase_cap() {
        let words: Vec<WordEntry> = (0..MAX_PHRASES + 20)
            .map(|i| word(&format!("term number{i:04}"), &[]))
            .collect();
        let index = PhraseIndex::build(&words);
        assert_eq!(index.len(), MAX_PHRASES + 20);
        // All phrases share a length, so ties sort alphabetically and the last one is skipped.
        let last = format!("term number{:04}", MAX_PHRASES + 19);
        let annotation = annotate(&last, &index);
        assert!(annotation.units().all(|s| s.kind == SegmentKind::Word));
        let annotation = annotate("term number0000", &index);
        assert_eq!(annotation.unit_count(), 1);
    }
}
