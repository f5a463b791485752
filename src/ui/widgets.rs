//! Custom widgets for the reader TUI.

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{block::BorderType, Block, Borders, Clear, Paragraph, Widget, Wrap},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::theme::{icons, Theme};
use crate::annotate::{Annotation, SegmentKind};
use crate::dictionary::Gloss;

// ══════════════════════════════════════════════════════════════════════════
// Logo Widget
// ══════════════════════════════════════════════════════════════════════════

pub struct Logo<'a> {
    theme: &'a Theme,
}

impl<'a> Logo<'a> {
    const ART: &'static str = r#"
    ╭──────────────────────────────────────────╮
    │  _ ____                _                 │
    │ (_)  _ \ ___  __ _  __| | ___ _ __       │
    │ | | |_) / _ \/ _` |/ _` |/ _ \ '__|      │
    │ | |  _ <  __/ (_| | (_| |  __/ |         │
    │ |_|_| \_\___|\__,_|\__,_|\___|_|  指令卡 │
    ╰──────────────────────────────────────────╯"#;

    pub fn new(theme: &'a Theme) -> Self {
        Self { theme }
    }
}

impl Widget for Logo<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines: Vec<Line> = Self::ART
            .lines()
            .skip(1)
            .map(|line| Line::from(Span::styled(line, Style::default().fg(self.theme.colors.primary))))
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .render(area, buf);
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Score Bar Widget
// ══════════════════════════════════════════════════════════════════════════

/// Quiz progress: position, points and fully correct cards.
pub struct ScoreBar<'a> {
    position: usize,
    total: usize,
    points: u32,
    correct: usize,
    answered: usize,
    theme: &'a Theme,
}

impl<'a> ScoreBar<'a> {
    pub fn new(
        position: usize,
        total: usize,
        points: u32,
        correct: usize,
        answered: usize,
        theme: &'a Theme,
    ) -> Self {
        Self { position, total, points, correct, answered, theme }
    }
}

impl Widget for ScoreBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::horizontal([
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ])
        .split(area);

        let cells = [
            ("Card ", format!("{}/{}", self.position.min(self.total), self.total)),
            ("Points ", self.points.to_string()),
            ("Correct ", format!("{}/{}", self.correct, self.answered)),
        ];
        for (chunk, (label, value)) in chunks.iter().zip(cells) {
            let line = Line::from(vec![
                Span::styled(label, self.theme.muted()),
                Span::styled(value, self.theme.highlight()),
            ]);
            Paragraph::new(line)
                .alignment(Alignment::Center)
                .render(*chunk, buf);
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Instruction Card Widget
// ══════════════════════════════════════════════════════════════════════════

/// One instruction: annotated English, optional Chinese underneath.
pub struct CardWidget<'a> {
    annotation: &'a Annotation<'a>,
    focus: Option<usize>,
    zh: Option<&'a str>,
    title: String,
    theme: &'a Theme,
}

impl<'a> CardWidget<'a> {
    pub fn new(
        annotation: &'a Annotation<'a>,
        focus: Option<usize>,
        zh: Option<&'a str>,
        title: String,
        theme: &'a Theme,
    ) -> Self {
        Self { annotation, focus, zh, title, theme }
    }
}

impl Widget for CardWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.theme.colors.primary))
            .title(Line::from(vec![
                Span::raw(" "),
                Span::styled(self.title, self.theme.highlight()),
                Span::raw(" "),
            ]))
            .style(Style::default().bg(self.theme.colors.bg_card));

        let inner = block.inner(area);
        block.render(area, buf);

        let mut lines = annotated_lines(self.annotation, self.focus, self.theme);
        if let Some(zh) = self.zh.filter(|zh| !zh.trim().is_empty()) {
            lines.push(Line::default());
            for text in zh.lines() {
                lines.push(Line::from(Span::styled(text, self.theme.chinese())));
            }
        }

        let content_area = Rect {
            x: inner.x + 1,
            y: inner.y + 1,
            width: inner.width.saturating_sub(2),
            height: inner.height.saturating_sub(1),
        };
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .render(content_area, buf);
    }
}

/// Styled lines for an annotation, with unit `focus` highlighted.
pub fn annotated_lines<'a>(
    annotation: &Annotation<'a>,
    focus: Option<usize>,
    theme: &Theme,
) -> Vec<Line<'a>> {
    let mut lines = vec![Line::default()];
    let mut unit = 0;
    for segment in &annotation.segments {
        let style = match segment.kind {
            SegmentKind::Plain => Style::default().fg(theme.colors.text),
            _ if focus == Some(unit) => theme.focused_unit(),
            SegmentKind::Word => theme.word_unit(),
            SegmentKind::Phrase => theme.phrase_unit(),
        };
        if segment.is_unit() {
            unit += 1;
        }

        for (i, piece) in segment.text.split('\n').enumerate() {
            if i > 0 {
                lines.push(Line::default());
            }
            if piece.is_empty() {
                continue;
            }
            if let Some(line) = lines.last_mut() {
                line.spans.push(Span::styled(piece, style));
            }
        }
    }
    lines
}

// ══════════════════════════════════════════════════════════════════════════
// Option List Widget
// ══════════════════════════════════════════════════════════════════════════

/// One option row in a quiz field.
pub struct OptionRow {
    pub label: String,
    pub selected: bool,
    /// Set once the card is answered: whether the option is in the key.
    pub expected: Option<bool>,
}

pub struct OptionList<'a> {
    title: &'a str,
    rows: Vec<OptionRow>,
    cursor: Option<usize>,
    multi: bool,
    theme: &'a Theme,
}

impl<'a> OptionList<'a> {
    pub fn new(
        title: &'a str,
        rows: Vec<OptionRow>,
        cursor: Option<usize>,
        multi: bool,
        theme: &'a Theme,
    ) -> Self {
        Self { title, rows, cursor, multi, theme }
    }
}

impl Widget for OptionList<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border = if self.cursor.is_some() {
            self.theme.colors.accent
        } else {
            self.theme.colors.text_dim
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title(format!(" {} ", self.title))
            .title_style(Style::default().fg(border).add_modifier(Modifier::BOLD));
        let inner = block.inner(area);
        block.render(area, buf);

        let width = inner.width.saturating_sub(6) as usize;
        let lines: Vec<Line> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mark = match (self.multi, row.selected) {
                    (true, true) => icons::BOX_ON,
                    (true, false) => icons::BOX_OFF,
                    (false, true) => icons::RADIO_ON,
                    (false, false) => icons::RADIO_OFF,
                };
                let style = match row.expected {
                    Some(true) => self.theme.correct(),
                    Some(false) if row.selected => self.theme.wrong(),
                    Some(false) => self.theme.dim(),
                    None if self.cursor == Some(i) => self.theme.selected(),
                    None => Style::default().fg(self.theme.colors.text),
                };
                let verdict = match row.expected {
                    Some(true) => icons::CHECK,
                    Some(false) if row.selected => icons::CROSS,
                    _ => " ",
                };
                Line::from(vec![
                    Span::styled(format!("{} ", mark), style),
                    Span::styled(truncate(&row.label, width), style),
                    Span::styled(format!(" {}", verdict), style),
                ])
            })
            .collect();

        Paragraph::new(lines).render(inner, buf);
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Gloss Popup Widget
// ══════════════════════════════════════════════════════════════════════════

pub struct GlossPopup<'a> {
    gloss: &'a Gloss,
    theme: &'a Theme,
}

impl<'a> GlossPopup<'a> {
    pub fn new(gloss: &'a Gloss, theme: &'a Theme) -> Self {
        Self { gloss, theme }
    }

    /// Rows needed to show the gloss at `width` columns, borders included.
    pub fn height(gloss: &Gloss, width: u16) -> u16 {
        let text_width = width.saturating_sub(4).max(1) as usize;
        let wrapped = |s: &str| textwrap::wrap(s, text_width).len().max(1);

        let mut rows = 2; // term + blank
        if !gloss.phonetic.is_empty() {
            rows += 1;
        }
        rows += wrapped(&gloss.zh);
        if !gloss.definition.is_empty() {
            rows += 1 + wrapped(&gloss.definition);
        }
        for example in gloss.examples.iter().take(2) {
            rows += 1 + wrapped(&example.en) + wrapped(&example.zh);
        }
        rows += 2; // hint line + spacing
        (rows + 2).min(u16::MAX as usize) as u16
    }
}

impl Widget for GlossPopup<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Clear.render(area, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.theme.colors.accent))
            .title(Line::from(vec![
                Span::raw(" "),
                Span::styled(icons::BOOK, Style::default()),
                Span::raw(" "),
            ]))
            .style(Style::default().bg(self.theme.colors.bg_card));
        let inner = block.inner(area);
        block.render(area, buf);

        let gloss = self.gloss;
        let mut lines = vec![Line::from(Span::styled(gloss.term.as_str(), self.theme.title()))];
        if !gloss.phonetic.is_empty() {
            lines.push(Line::from(Span::styled(gloss.phonetic.as_str(), self.theme.muted())));
        }
        lines.push(Line::default());

        let zh = if !gloss.zh.is_empty() {
            Span::styled(gloss.zh.as_str(), self.theme.chinese())
        } else if gloss.loading {
            Span::styled("查询中…", self.theme.dim())
        } else {
            Span::styled("（暂无释义）", self.theme.dim())
        };
        lines.push(Line::from(zh));

        if !gloss.definition.is_empty() {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                gloss.definition.as_str(),
                Style::default().fg(self.theme.colors.text),
            )));
        }
        for example in gloss.examples.iter().take(2) {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                example.en.as_str(),
                Style::default().fg(self.theme.colors.text).add_modifier(Modifier::ITALIC),
            )));
            lines.push(Line::from(Span::styled(example.zh.as_str(), self.theme.chinese())));
        }

        lines.push(Line::default());
        lines.push(Line::from(vec![
            Span::styled("a", self.theme.key_highlight()),
            Span::styled(" add to word bank  ", self.theme.key_hint()),
            Span::styled("Esc", self.theme.key_highlight()),
            Span::styled(" close", self.theme.key_hint()),
        ]));

        let content_area = Rect {
            x: inner.x + 1,
            width: inner.width.saturating_sub(2),
            ..inner
        };
        Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .render(content_area, buf);
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Key Hints Widget
// ══════════════════════════════════════════════════════════════════════════

pub struct KeyHints<'a> {
    hints: &'a [(&'a str, &'a str)],
    theme: &'a Theme,
}

impl<'a> KeyHints<'a> {
    pub fn new(hints: &'a [(&'a str, &'a str)], theme: &'a Theme) -> Self {
        Self { hints, theme }
    }
}

impl Widget for KeyHints<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let spans: Vec<Span> = self
            .hints
            .iter()
            .flat_map(|(key, desc)| {
                vec![
                    Span::styled(*key, self.theme.key_highlight()),
                    Span::styled(format!(" {} ", desc), self.theme.key_hint()),
                    Span::styled("│ ", Style::default().fg(self.theme.colors.text_dim)),
                ]
            })
            .collect();

        Paragraph::new(Line::from(spans))
            .alignment(Alignment::Center)
            .render(area, buf);
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Quiz Summary Widget
// ══════════════════════════════════════════════════════════════════════════

pub struct QuizSummary<'a> {
    cards: usize,
    correct: usize,
    points: u32,
    theme: &'a Theme,
}

impl<'a> QuizSummary<'a> {
    pub fn new(cards: usize, correct: usize, points: u32, theme: &'a Theme) -> Self {
        Self { cards, correct, points, theme }
    }
}

impl Widget for QuizSummary<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.theme.colors.success))
            .title(Line::from(vec![
                Span::raw(" "),
                Span::styled("QUIZ COMPLETE", self.theme.correct()),
                Span::raw(" "),
            ]))
            .title_alignment(Alignment::Center);

        let inner = block.inner(area);
        block.render(area, buf);

        let value = |v: String| Span::styled(v, self.theme.highlight());
        let text = vec![
            Line::from(""),
            Line::from(vec![
                Span::styled("Cards: ", self.theme.muted()),
                value(self.cards.to_string()),
            ]),
            Line::from(vec![
                Span::styled("Fully correct: ", self.theme.muted()),
                value(self.correct.to_string()),
            ]),
            Line::from(vec![
                Span::styled("Points: ", self.theme.muted()),
                value(format!("{} / {}", self.points, self.cards * 3)),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::styled("Press ", self.theme.dim()),
                Span::styled("n", self.theme.key_highlight()),
                Span::styled(" for a new round or ", self.theme.dim()),
                Span::styled("Esc", self.theme.key_highlight()),
                Span::styled(" to return", self.theme.dim()),
            ]),
        ];

        Paragraph::new(text)
            .alignment(Alignment::Center)
            .render(inner, buf);
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════

/// Cut `s` to at most `max_width` terminal columns, marking the cut with `…`.
pub fn truncate(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }
    if max_width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in s.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max_width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{annotate, PhraseIndex};
    use crate::models::WordEntry;

    #[test]
    fn test_truncate_counts_columns() {
        assert_eq!(truncate("area", 10), "area");
        assert_eq!(truncate("perimeter", 5), "peri…");
        assert_eq!(truncate("面积面积面积", 5), "面积…");
        assert_eq!(truncate("面积", 0), "");
    }

    #[test]
    fn test_annotated_lines_split_on_newlines() {
        let index = PhraseIndex::default();
        let annotation = annotate("Find the area.\nShow work.", &index);
        let lines = annotated_lines(&annotation, Some(0), &Theme::default());
        assert_eq!(lines.len(), 2);
        let first: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(first, "Find the area.");
        assert_eq!(lines[0].spans[0].style, Theme::default().focused_unit());
    }

    #[test]
    fn test_gloss_height_grows_with_content() {
        let short = Gloss::from_local("area", None);
        let mut entry = WordEntry::new("area", "面积");
        entry.hint = "the size of a surface, measured in square units such as square metres".into();
        let long = Gloss::from_local("area", Some(&entry));
        assert!(GlossPopup::height(&long, 30) > GlossPopup::height(&short, 30));
    }
}
