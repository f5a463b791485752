//! Theme and styling for the TUI.

use ratatui::style::{Color, Modifier, Style};

/// Color palette for a theme.
#[derive(Debug, Clone)]
pub struct ThemeColors {
    // Brand Colors
    pub primary: Color,
    pub accent: Color,

    // Semantic Colors
    pub success: Color,
    pub error: Color,

    // Background Colors
    pub bg_dark: Color,
    pub bg_card: Color,
    pub bg_highlight: Color,

    // Text Colors
    pub text: Color,
    pub text_muted: Color,
    pub text_dim: Color,
    pub chinese: Color,

    // Lookup Units
    pub word: Color,
    pub phrase: Color,
}

/// Available theme names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeName {
    EyeCare,
    Dark,
}

impl ThemeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeName::EyeCare => "eye-care",
            ThemeName::Dark => "dark",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ThemeName::EyeCare => "护眼绿",
            ThemeName::Dark => "夜间",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dark" | "night" => ThemeName::Dark,
            _ => ThemeName::EyeCare,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            ThemeName::EyeCare => ThemeName::Dark,
            ThemeName::Dark => ThemeName::EyeCare,
        }
    }
}

/// Theme struct that holds colors and provides style methods.
#[derive(Debug, Clone)]
pub struct Theme {
    pub name: ThemeName,
    pub colors: ThemeColors,
}

impl Theme {
    pub fn new(name: ThemeName) -> Self {
        let colors = match name {
            ThemeName::EyeCare => Self::eye_care_colors(),
            ThemeName::Dark => Self::dark_colors(),
        };
        Self { name, colors }
    }

    pub fn from_name(name: &str) -> Self {
        Self::new(ThemeName::from_str(name))
    }

    /// Soft green page, dark ink.
    fn eye_care_colors() -> ThemeColors {
        ThemeColors {
            primary: Color::Rgb(46, 125, 50),       // Green 800
            accent: Color::Rgb(173, 20, 87),        // Pink 800

            success: Color::Rgb(27, 94, 32),        // Green 900
            error: Color::Rgb(198, 40, 40),         // Red 800

            bg_dark: Color::Rgb(199, 237, 204),     // 护眼绿
            bg_card: Color::Rgb(220, 244, 222),
            bg_highlight: Color::Rgb(165, 214, 167), // Green 200

            text: Color::Rgb(33, 33, 33),
            text_muted: Color::Rgb(66, 82, 68),
            text_dim: Color::Rgb(110, 130, 112),
            chinese: Color::Rgb(56, 70, 90),

            word: Color::Rgb(33, 33, 33),
            phrase: Color::Rgb(21, 101, 192),
        }
    }

    fn dark_colors() -> ThemeColors {
        ThemeColors {
            primary: Color::Rgb(99, 102, 241),      // Indigo
            accent: Color::Rgb(236, 72, 153),       // Pink

            success: Color::Rgb(34, 197, 94),       // Green
            error: Color::Rgb(239, 68, 68),         // Red

            bg_dark: Color::Rgb(15, 23, 42),        // Slate 900
            bg_card: Color::Rgb(30, 41, 59),        // Slate 800
            bg_highlight: Color::Rgb(71, 85, 105),  // Slate 600

            text: Color::Rgb(248, 250, 252),        // Slate 50
            text_muted: Color::Rgb(148, 163, 184),  // Slate 400
            text_dim: Color::Rgb(100, 116, 139),    // Slate 500
            chinese: Color::Rgb(203, 213, 225),     // Slate 300

            word: Color::Rgb(248, 250, 252),
            phrase: Color::Rgb(125, 211, 252),      // Sky 300
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Styles
    // ══════════════════════════════════════════════════════════════════════

    pub fn title(&self) -> Style {
        Style::default()
            .fg(self.colors.text)
            .add_modifier(Modifier::BOLD)
    }

    pub fn highlight(&self) -> Style {
        Style::default()
            .fg(self.colors.primary)
            .add_modifier(Modifier::BOLD)
    }

    pub fn selected(&self) -> Style {
        Style::default()
            .bg(self.colors.bg_highlight)
            .fg(self.colors.text)
    }

    pub fn muted(&self) -> Style {
        Style::default().fg(self.colors.text_muted)
    }

    pub fn dim(&self) -> Style {
        Style::default().fg(self.colors.text_dim)
    }

    pub fn chinese(&self) -> Style {
        Style::default().fg(self.colors.chinese)
    }

    pub fn word_unit(&self) -> Style {
        Style::default().fg(self.colors.word)
    }

    pub fn phrase_unit(&self) -> Style {
        Style::default()
            .fg(self.colors.phrase)
            .add_modifier(Modifier::UNDERLINED)
    }

    pub fn focused_unit(&self) -> Style {
        Style::default()
            .bg(self.colors.accent)
            .fg(self.colors.bg_card)
            .add_modifier(Modifier::BOLD)
    }

    pub fn correct(&self) -> Style {
        Style::default()
            .fg(self.colors.success)
            .add_modifier(Modifier::BOLD)
    }

    pub fn wrong(&self) -> Style {
        Style::default()
            .fg(self.colors.error)
            .add_modifier(Modifier::BOLD)
    }

    pub fn key_hint(&self) -> Style {
        Style::default()
            .fg(self.colors.text_dim)
    }

    pub fn key_highlight(&self) -> Style {
        Style::default()
            .fg(self.colors.accent)
            .add_modifier(Modifier::BOLD)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(ThemeName::EyeCare)
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Icons
// ══════════════════════════════════════════════════════════════════════════

pub mod icons {
    pub const CHECK: &str = "✓";
    pub const CROSS: &str = "✗";
    pub const BOX_ON: &str = "[x]";
    pub const BOX_OFF: &str = "[ ]";
    pub const RADIO_ON: &str = "(•)";
    pub const RADIO_OFF: &str = "( )";
    pub const BOOK: &str = "📚";
}
