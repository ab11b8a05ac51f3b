use crate::domain::clock::{day_progress_percent, twelve_hour_label};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum QuoteStyle {
    #[default]
    Motivational,
    TimeFocused,
    Productivity,
}

impl QuoteStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Motivational => "motivational",
            Self::TimeFocused => "time-focused",
            Self::Productivity => "productivity",
        }
    }

    /// Unrecognized keys resolve to `Motivational`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "time-focused" | "time_focused" | "timefocused" => Self::TimeFocused,
            "productivity" => Self::Productivity,
            _ => Self::Motivational,
        }
    }
}

impl From<String> for QuoteStyle {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<QuoteStyle> for String {
    fn from(value: QuoteStyle) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteContext {
    pub hour: u32,
    pub day_progress: u8,
}

impl QuoteContext {
    pub fn at_hour(hour: u32) -> Self {
        Self {
            hour,
            day_progress: day_progress_percent(hour),
        }
    }
}

const MOTIVATIONAL: &[&str] = &[
    "Every hour is a fresh chance to move toward what matters to you.",
    "You are building something worthwhile, one hour at a time.",
    "This hour belongs to you. Spend it on purpose.",
    "Small, steady actions each hour add up to remarkable results.",
    "You can make the next hour your best one yet.",
];

const PRODUCTIVITY: &[&str] = &[
    "Focus is a skill. Use this hour to practice it.",
    "One focused hour can do what a scattered day cannot.",
    "Pick the single most important thing and give this hour to it.",
    "Being productive is about intent, not about being busy.",
    "Treat this hour as the most valuable resource you own today.",
];

const TIME_FOCUSED_TEMPLATES: usize = 5;

fn time_focused(index: usize, context: QuoteContext) -> String {
    let QuoteContext { hour, day_progress } = context;
    match index {
        0 => format!(
            "It's {}. {day_progress}% of today is behind you. How is it going?",
            twelve_hour_label(hour)
        ),
        1 => format!("{hour}:00, a clean slate. What will this hour hold?"),
        2 => format!(
            "Time check: {day_progress}% of the day is done. The rest is yours to shape."
        ),
        3 => format!("Hour {hour} of 24. Each one is a building block."),
        _ => format!(
            "{} momentum: you are {day_progress}% through today.",
            if hour >= 12 { "Afternoon" } else { "Morning" }
        ),
    }
}

/// Picks uniformly among the entries for `style`. Time-focused entries are rendered
/// with `context` at selection time.
pub fn select_quote<R: Rng + ?Sized>(style: QuoteStyle, context: QuoteContext, rng: &mut R) -> String {
    match style {
        QuoteStyle::Motivational => pick(MOTIVATIONAL, rng),
        QuoteStyle::Productivity => pick(PRODUCTIVITY, rng),
        QuoteStyle::TimeFocused => time_focused(rng.gen_range(0..TIME_FOCUSED_TEMPLATES), context),
    }
}

fn pick<R: Rng + ?Sized>(entries: &[&str], rng: &mut R) -> String {
    entries
        .choose(rng)
        .map(|value| (*value).to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuoteCategory {
    Time,
    Productivity,
    Motivation,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct BannerQuote {
    pub text: &'static str,
    pub author: &'static str,
    pub category: QuoteCategory,
}

pub const BANNER_QUOTES: &[BannerQuote] = &[
    BannerQuote {
        text: "An hour is more than sixty minutes. It is the unit that achievement is built from.",
        author: "Time Mastery",
        category: QuoteCategory::Time,
    },
    BannerQuote {
        text: "The hour you invest in yourself today shapes the tomorrow you want.",
        author: "Productivity Wisdom",
        category: QuoteCategory::Productivity,
    },
    BannerQuote {
        text: "Every hour is a chance to reset, refocus and recommit.",
        author: "Focus Philosophy",
        category: QuoteCategory::Motivation,
    },
    BannerQuote {
        text: "Time is not money. Time is life. Live each hour fully.",
        author: "Life Balance",
        category: QuoteCategory::Time,
    },
    BannerQuote {
        text: "Successful people manage their energy within each hour, not the clock.",
        author: "Energy Management",
        category: QuoteCategory::Productivity,
    },
    BannerQuote {
        text: "An hour of focused work beats a day of distraction.",
        author: "Deep Work Principles",
        category: QuoteCategory::Productivity,
    },
    BannerQuote {
        text: "Each hour is a blank canvas. Paint it with intention.",
        author: "Mindful Living",
        category: QuoteCategory::Motivation,
    },
    BannerQuote {
        text: "Productivity is doing the right things in each hour, not more things.",
        author: "Effectiveness First",
        category: QuoteCategory::Productivity,
    },
];

pub fn random_banner_quote<R: Rng + ?Sized>(rng: &mut R) -> BannerQuote {
    *BANNER_QUOTES.choose(rng).unwrap_or(&BANNER_QUOTES[0])
}
