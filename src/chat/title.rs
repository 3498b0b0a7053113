//! Conversation title generation helpers
//!
//! A conversation gets its title from the model right after the first
//! assistant reply. This module builds the title request from a short
//! preview of the opening exchange and sanitizes whatever the model
//! sends back; the session wires it in as a best-effort step that never
//! fails a turn.

use crate::message::Role;
use crate::providers::ModelTurn;

/// Preview of the conversation fed to the title request, in characters.
const MAX_PREVIEW_CHARS: usize = 500;
/// Longest accepted title, in characters.
const MAX_TITLE_CHARS: usize = 100;
/// Titles over the limit are cut here and suffixed with "...".
const TRUNCATED_TITLE_CHARS: usize = 97;
/// Anything shorter than this is rejected as not a title.
const MIN_TITLE_CHARS: usize = 3;
/// Share of Japanese characters that switches the prompt language.
const JAPANESE_RATIO: f32 = 0.3;

/// Builds the turns for a title request from the opening exchange.
///
/// The preview labels each message with its speaker and stops at
/// 500 characters; the instruction language follows the conversation
/// (Japanese-dominant previews get the Japanese instruction).
pub(crate) fn build_request(turns: &[ModelTurn]) -> Vec<ModelTurn> {
    let preview = conversation_preview(turns);
    let instruction = if is_japanese_dominant(&preview) {
        "次の会話に短いタイトルを付けてください（最大10語）。タイトルのみを返してください。"
    } else {
        "Give this conversation a short title (at most 10 words). Reply with the title only."
    };
    vec![
        ModelTurn::new(Role::System, instruction),
        ModelTurn::new(Role::User, preview),
    ]
}

/// Cleans a raw model reply into a usable title, or rejects it.
///
/// Strips label prefixes and surrounding quotes, truncates over-long
/// titles to 97 characters plus an ellipsis, and rejects results shorter
/// than 3 characters.
pub(crate) fn sanitize(raw: &str) -> Option<String> {
    let mut title = raw.trim().to_string();

    for prefix in ["title:", "タイトル:", "タイトル：", "題名:", "題名："] {
        let lowered = title.to_lowercase();
        if lowered.starts_with(prefix) {
            title = title.chars().skip(prefix.chars().count()).collect();
            title = title.trim().to_string();
        }
    }

    for (open, close) in [("\"", "\""), ("'", "'"), ("「", "」"), ("『", "』"), ("“", "”")] {
        if title.starts_with(open) && title.ends_with(close) && title.len() > open.len() + close.len() {
            title = title[open.len()..title.len() - close.len()].trim().to_string();
        }
    }

    truncate_title(&title)
}

/// Fallback when the model reply yields nothing: the first non-empty
/// user message, truncated like a title.
pub(crate) fn fallback(turns: &[ModelTurn]) -> Option<String> {
    turns
        .iter()
        .find(|turn| turn.role == Role::User && !turn.text.trim().is_empty())
        .and_then(|turn| truncate_title(turn.text.trim()))
}

fn truncate_title(title: &str) -> Option<String> {
    let chars = title.chars().count();
    if chars < MIN_TITLE_CHARS {
        return None;
    }
    if chars > MAX_TITLE_CHARS {
        let mut cut: String = title.chars().take(TRUNCATED_TITLE_CHARS).collect();
        cut.push_str("...");
        return Some(cut);
    }
    Some(title.to_string())
}

fn conversation_preview(turns: &[ModelTurn]) -> String {
    let mut preview = String::new();
    for turn in turns {
        let label = match turn.role {
            Role::User => "User: ",
            Role::Assistant => "Assistant: ",
            Role::System => continue,
        };
        if !preview.is_empty() {
            preview.push('\n');
        }
        preview.push_str(label);
        preview.push_str(turn.text.trim());
        if preview.chars().count() >= MAX_PREVIEW_CHARS {
            preview = preview.chars().take(MAX_PREVIEW_CHARS).collect();
            break;
        }
    }
    preview
}

fn is_japanese_dominant(text: &str) -> bool {
    let mut total = 0usize;
    let mut japanese = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if matches!(c,
            '\u{3040}'..='\u{309F}' // hiragana
            | '\u{30A0}'..='\u{30FF}' // katakana
            | '\u{4E00}'..='\u{9FAF}' // kanji
        ) {
            japanese += 1;
        }
    }
    total > 0 && (japanese as f32 / total as f32) > JAPANESE_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, text: &str) -> ModelTurn {
        ModelTurn::new(role, text)
    }

    #[test]
    fn test_request_labels_speakers_and_skips_system() {
        let turns = vec![
            turn(Role::System, "be helpful"),
            turn(Role::User, "how do trees branch?"),
            turn(Role::Assistant, "at every fork"),
        ];
        let request = build_request(&turns);
        assert_eq!(request.len(), 2);
        assert_eq!(request[0].role, Role::System);
        let preview = &request[1].text;
        assert!(preview.contains("User: how do trees branch?"));
        assert!(preview.contains("Assistant: at every fork"));
        assert!(!preview.contains("be helpful"));
    }

    #[test]
    fn test_preview_capped_at_limit() {
        let long = "x".repeat(2000);
        let turns = vec![turn(Role::User, &long)];
        let request = build_request(&turns);
        assert_eq!(request[1].text.chars().count(), 500);
    }

    #[test]
    fn test_japanese_preview_switches_instruction() {
        let turns = vec![turn(Role::User, "木構造について教えてください")];
        let request = build_request(&turns);
        assert!(request[0].text.contains("タイトル"));

        let turns = vec![turn(Role::User, "tell me about trees")];
        let request = build_request(&turns);
        assert!(request[0].text.starts_with("Give this conversation"));
    }

    #[test]
    fn test_sanitize_strips_prefix_and_quotes() {
        assert_eq!(
            sanitize("Title: \"Branching Chats\"").as_deref(),
            Some("Branching Chats")
        );
        assert_eq!(
            sanitize("タイトル：「木の話」").as_deref(),
            Some("木の話")
        );
        assert_eq!(sanitize("  Plain Title  ").as_deref(), Some("Plain Title"));
    }

    #[test]
    fn test_sanitize_truncates_long_titles() {
        let long = "t".repeat(150);
        let title = sanitize(&long).expect("title expected");
        assert_eq!(title.chars().count(), 100);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_sanitize_rejects_tiny_titles() {
        assert!(sanitize("ok").is_none());
        assert!(sanitize("  ").is_none());
        assert!(sanitize("").is_none());
    }

    #[test]
    fn test_fallback_picks_first_user_message() {
        let turns = vec![
            turn(Role::System, ""),
            turn(Role::User, "   "),
            turn(Role::User, "what is a cursor?"),
        ];
        assert_eq!(fallback(&turns).as_deref(), Some("what is a cursor?"));
    }

    #[test]
    fn test_fallback_truncates_like_a_title() {
        let long = "u".repeat(150);
        let turns = vec![turn(Role::User, &long)];
        let fallback_title = fallback(&turns).expect("fallback expected");
        assert_eq!(fallback_title.chars().count(), 100);
    }

    #[test]
    fn test_fallback_without_user_text_is_none() {
        let turns = vec![turn(Role::System, "setup only")];
        assert!(fallback(&turns).is_none());
    }
}
