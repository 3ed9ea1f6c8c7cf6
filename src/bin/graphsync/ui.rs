use std::borrow::Cow;
use std::fmt::Display;
use std::io::IsTerminal;

use nu_ansi_term::{Color, Style};

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Kind of one-line status message.
#[derive(Clone, Copy, Debug)]
pub enum Tone {
    Info,
    Success,
    Warn,
}

impl Tone {
    fn icon(self) -> &'static str {
        match self {
            Tone::Info => "ℹ",
            Tone::Success => "✔",
            Tone::Warn => "⚠",
        }
    }
}

/// Text renderer for statement listings. Colors only reach a terminal.
pub struct Ui {
    palette: Option<Palette>,
}

impl Ui {
    pub fn new(theme: Theme) -> Self {
        let palette = match theme {
            Theme::Plain => None,
            _ if !std::io::stdout().is_terminal() => None,
            Theme::Light => Some(Palette::light()),
            Theme::Auto | Theme::Dark => Some(Palette::dark()),
        };

        #[cfg(windows)]
        if palette.is_some() {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        Self { palette }
    }

    fn paint<'a>(&self, pick: fn(&Palette) -> Style, text: &'a str) -> Cow<'a, str> {
        match &self.palette {
            Some(palette) => Cow::Owned(pick(palette).paint(text).to_string()),
            None => Cow::Borrowed(text),
        }
    }

    pub fn spacer(&self) {
        println!();
    }

    pub fn heading(&self, title: &str) {
        println!("{}", self.paint(|p| p.heading, &format!("▸ {title}")));
    }

    /// Aligned `key: value` rows under a heading; nothing when empty.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        for (key, value) in &rows {
            let key = format!("{key:>width$}:");
            println!("  {} {}", self.paint(|p| p.key, &key), self.paint(|p| p.text, value));
        }
    }

    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entries: Vec<String> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        self.heading(title);
        let bullet = if self.palette.is_some() { "•" } else { "-" };
        for entry in &entries {
            println!("  {} {entry}", self.paint(|p| p.accent, bullet));
        }
    }

    /// Statement body, indented under the current heading.
    pub fn block(&self, text: &str) {
        for line in text.lines() {
            println!("    {}", self.paint(|p| p.text, line));
        }
    }

    /// Status line; warnings go to stderr.
    pub fn notice(&self, tone: Tone, message: &str) {
        let icon = match tone {
            Tone::Info => self.paint(|p| p.info, tone.icon()),
            Tone::Success => self.paint(|p| p.success, tone.icon()),
            Tone::Warn => self.paint(|p| p.warn, tone.icon()),
        };
        match tone {
            Tone::Warn => eprintln!("{icon} {message}"),
            Tone::Info | Tone::Success => println!("{icon} {message}"),
        }
    }
}

struct Palette {
    heading: Style,
    key: Style,
    text: Style,
    accent: Style,
    info: Style,
    success: Style,
    warn: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Color::Purple.bold(),
            key: Color::LightBlue.bold(),
            text: Style::new().fg(Color::White),
            accent: Style::new().fg(Color::LightBlue),
            info: Style::new().fg(Color::LightCyan),
            success: Color::LightGreen.bold(),
            warn: Color::Yellow.bold(),
        }
    }

    fn light() -> Self {
        Self {
            heading: Color::Blue.bold(),
            key: Color::Black.bold(),
            text: Style::new().fg(Color::Black),
            accent: Style::new().fg(Color::Blue),
            info: Style::new().fg(Color::Purple),
            success: Color::Green.bold(),
            warn: Color::Red.bold(),
        }
    }
}
