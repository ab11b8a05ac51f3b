use crate::domain::clock::{day_progress_percent, time_of_day};
use crate::domain::models::{AiMessageKind, ProfileSettings};
use crate::domain::quotes::QuoteStyle;

const UNSPECIFIED: &str = "Not specified";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub nickname: Option<String>,
    pub weekly_goals: Option<String>,
    pub daily_focus: Option<String>,
    pub hour: u32,
    pub day_progress: u8,
}

impl PromptContext {
    pub fn new(profile: &ProfileSettings, hour: u32) -> Self {
        Self {
            nickname: non_empty(&profile.nickname),
            weekly_goals: non_empty(&profile.weekly_goals),
            daily_focus: non_empty(&profile.daily_focus),
            hour,
            day_progress: day_progress_percent(hour),
        }
    }

    fn nickname_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.nickname.as_deref().unwrap_or(fallback)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub fn build_prompt(kind: AiMessageKind, context: &PromptContext) -> String {
    let name = context.nickname_or("the user");
    let (opening, asks) = match kind {
        AiMessageKind::Greeting => (
            format!("You are a productivity coach. Greet {name} as they begin their day."),
            "- address them by name\n- mention their goals or focus when given\n- keep it upbeat and personal",
        ),
        AiMessageKind::Hourly => (
            format!("You are {name}'s productivity coach. Write a check-in for the start of a new hour."),
            "- address them by name\n- tie it to their current focus\n- acknowledge how far into the day they are\n- offer one small tip or nudge",
        ),
        AiMessageKind::Interval => (
            format!("You are {name}'s productivity coach. Write a short periodic check-in."),
            "- address them by name\n- connect to their goals and focus\n- encourage them or share a practical tip",
        ),
    };

    let mut facts = vec![
        format!("- Nickname: {}", context.nickname_or("User")),
        format!(
            "- Weekly goals: {}",
            context.weekly_goals.as_deref().unwrap_or(UNSPECIFIED)
        ),
        format!(
            "- Today's focus: {}",
            context.daily_focus.as_deref().unwrap_or(UNSPECIFIED)
        ),
        format!("- Time: {} ({}:00)", time_of_day(context.hour), context.hour),
    ];
    if kind != AiMessageKind::Greeting {
        facts.push(format!("- Day progress: {}% complete", context.day_progress));
    }

    format!(
        "{opening}\n\nContext:\n{}\n\nThe message should:\n{asks}\n- be one or two sentences\n\nReply with the message only, conversational and without quotation marks.",
        facts.join("\n")
    )
}

/// Prompt for the quote on the hour popup.
pub fn build_popup_quote_prompt(hour: u32, hours_left_today: i64, style: QuoteStyle) -> String {
    let facts = [
        format!("- Time: {hour}:00 ({})", time_of_day(hour)),
        format!("- Day progress: {}% complete", day_progress_percent(hour)),
        format!("- Hours left today: {hours_left_today}"),
        format!("- Style: {}", style.as_str()),
    ];
    format!(
        "Write a short, encouraging reminder for someone who just finished an hour in a productivity app.\n\nContext:\n{}\n\nTalk to them directly in a friendly, conversational tone. Avoid quotation marks, clock labels like \"4 PM:\" and formal structure. One or two sentences.",
        facts.join("\n")
    )
}

/// Canned message used whenever generation fails.
pub fn fallback_message(kind: AiMessageKind, context: &PromptContext) -> String {
    match kind {
        AiMessageKind::Greeting => format!(
            "Hey {}! Ready to tackle your goals today?",
            context.nickname_or("there")
        ),
        AiMessageKind::Hourly => format!(
            "{}, you're {}% through the day. Keep that momentum going!",
            context.nickname_or("Hey"),
            context.day_progress
        ),
        AiMessageKind::Interval => format!(
            "Hope you're making great progress on your focus areas, {}!",
            context.nickname_or("friend")
        ),
    }
}

const QUOTE_CHARS: &[char] = &['"', '\'', '\u{201C}', '\u{201D}'];

/// Strips surrounding whitespace and quote marks. `None` when nothing is left.
pub fn clean_generated(text: &str) -> Option<String> {
    let cleaned = text
        .trim()
        .trim_matches(|c: char| QUOTE_CHARS.contains(&c) || c.is_whitespace())
        .to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(nickname: &str) -> ProfileSettings {
        ProfileSettings {
            enabled: true,
            nickname: nickname.to_string(),
            weekly_goals: "Ship the beta".to_string(),
            daily_focus: String::new(),
            chat_interval_minutes: 30,
        }
    }

    #[test]
    fn prompt_embeds_profile_and_progress() {
        let context = PromptContext::new(&profile("Sam"), 16);
        let prompt = build_prompt(AiMessageKind::Hourly, &context);
        assert!(prompt.contains("Sam"));
        assert!(prompt.contains("Ship the beta"));
        assert!(prompt.contains("Today's focus: Not specified"));
        assert!(prompt.contains("afternoon (16:00)"));
        assert!(prompt.contains("67% complete"));

        let greeting = build_prompt(AiMessageKind::Greeting, &context);
        assert!(!greeting.contains("Day progress"));
    }

    #[test]
    fn fallbacks_use_nickname_or_defaults() {
        let named = PromptContext::new(&profile("Sam"), 12);
        assert_eq!(
            fallback_message(AiMessageKind::Hourly, &named),
            "Sam, you're 50% through the day. Keep that momentum going!"
        );

        let anonymous = PromptContext::new(&profile("  "), 9);
        assert_eq!(
            fallback_message(AiMessageKind::Greeting, &anonymous),
            "Hey there! Ready to tackle your goals today?"
        );
        assert_eq!(
            fallback_message(AiMessageKind::Interval, &anonymous),
            "Hope you're making great progress on your focus areas, friend!"
        );
    }

    #[test]
    fn popup_quote_prompt_carries_time_context() {
        let prompt = build_popup_quote_prompt(16, 8, QuoteStyle::TimeFocused);
        assert!(prompt.contains("16:00 (afternoon)"));
        assert!(prompt.contains("67% complete"));
        assert!(prompt.contains("Hours left today: 8"));
        assert!(prompt.contains("Style: time-focused"));
    }

    #[test]
    fn generated_text_is_unquoted_and_trimmed() {
        assert_eq!(
            clean_generated("  \"Keep going, Sam!\"\n").as_deref(),
            Some("Keep going, Sam!")
        );
        assert_eq!(
            clean_generated("\u{201C}You've got this.\u{201D}").as_deref(),
            Some("You've got this.")
        );
        assert_eq!(clean_generated(" \"\" "), None);
        assert_eq!(clean_generated("don't stop").as_deref(), Some("don't stop"));
    }
}
