/// Waybar JSON renderer.
///
/// Turns the focused player into one `{"class","text","tooltip"}` line.  The
/// element order and symbols come from `RenderOptions`; everything else about
/// the output is fixed so that two instances with the same options produce
/// byte-identical lines.
use players_proto::config::RenderConfig;
use players_proto::state::PlaybackSource;
use serde::Serialize;

/// Line emitted when there is nothing to show.
pub const EMPTY_LINE: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Symbol,
    Artist,
    Album,
    Title,
    Position,
}

impl Element {
    fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "SYMBOL" => Some(Element::Symbol),
            "ARTIST" => Some(Element::Artist),
            "ALBUM" => Some(Element::Album),
            "TITLE" => Some(Element::Title),
            "POSITION" => Some(Element::Position),
            _ => None,
        }
    }

    /// Symbol and position are followed by a space instead of the separator,
    /// and text directly before them gets nothing.
    fn is_inline(self) -> bool {
        matches!(self, Element::Symbol | Element::Position)
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub play: String,
    pub pause: String,
    pub separator: String,
    pub order: Vec<Element>,
    pub show_position: bool,
}

impl RenderOptions {
    /// Parse a colon-separated order string.  Unknown elements are skipped.
    pub fn parse_order(order: &str) -> Vec<Element> {
        order.split(':').filter_map(Element::parse).collect()
    }
}

impl From<&RenderConfig> for RenderOptions {
    fn from(cfg: &RenderConfig) -> Self {
        Self {
            play: cfg.play.clone(),
            pause: cfg.pause.clone(),
            separator: cfg.separator.clone(),
            order: Self::parse_order(&cfg.order),
            show_position: cfg.position,
        }
    }
}

#[derive(Serialize)]
struct Line<'a> {
    class: &'a str,
    text: String,
    tooltip: String,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    options: RenderOptions,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Render `source`.  `position` overrides the reported position, for
    /// interpolation between backend updates.
    pub fn render(&self, source: Option<&PlaybackSource>, position: Option<i64>) -> String {
        let Some(p) = source else {
            return EMPTY_LINE.to_string();
        };

        let (symbol, class) = if p.playing {
            (self.options.play.as_str(), "playing")
        } else {
            (self.options.pause.as_str(), "paused")
        };
        let pos = if self.options.show_position {
            format_position(position.unwrap_or(p.position), p.length)
        } else {
            String::new()
        };

        let mut items: Vec<(Element, &str)> = Vec::new();
        for element in &self.options.order {
            let value = match element {
                Element::Symbol => symbol,
                Element::Artist => p.artist.as_str(),
                Element::Album => p.album.as_str(),
                Element::Title => p.title.as_str(),
                Element::Position => pos.as_str(),
            };
            // The symbol is kept even when empty so spacing stays stable.
            if *element == Element::Symbol || !value.is_empty() {
                items.push((*element, value));
            }
        }
        if items.is_empty() {
            return EMPTY_LINE.to_string();
        }

        let mut text = String::new();
        for (i, (element, value)) in items.iter().enumerate() {
            text.push_str(value);
            if let Some((next, _)) = items.get(i + 1) {
                if element.is_inline() {
                    text.push(' ');
                } else if !next.is_inline() {
                    text.push_str(&self.options.separator);
                }
            }
        }

        let line = Line {
            class,
            text,
            tooltip: tooltip(p),
        };
        serde_json::to_string(&line).unwrap_or_else(|_| EMPTY_LINE.to_string())
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
}

fn tooltip(p: &PlaybackSource) -> String {
    let mut tip = String::new();
    if !p.artist.is_empty() || !p.title.is_empty() {
        tip.push_str(&format!("{}\nby {}\n", escape(&p.title), escape(&p.artist)));
    }
    if !p.album.is_empty() {
        tip.push_str(&format!("from {}\n", escape(&p.album)));
    }
    tip.push_str(&format!("({})", p.name));
    tip
}

fn format_clock(micros: i64) -> String {
    let secs = micros / 1_000_000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// `(MM:SS/MM:SS)`, `(MM:SS)` when the length is unknown, empty when the
/// position is unknown.
pub fn format_position(position: i64, length: i64) -> String {
    if position < 0 {
        return String::new();
    }
    if length > 0 {
        format!("({}/{})", format_clock(position), format_clock(length))
    } else {
        format!("({})", format_clock(position))
    }
}
