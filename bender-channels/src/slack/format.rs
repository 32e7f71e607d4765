//! Slack text helpers: mention stripping and message splitting.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum characters per posted Slack message.
pub const SLACK_MSG_LIMIT: usize = 4000;

/// One or more leading `<@U...>` / `<@B...>` / `<@W...>` markers.
static LEADING_MENTIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:<@[BUW][A-Za-z0-9]+>\s*)+").unwrap());

/// Remove all leading mention markers and surrounding whitespace.
pub fn strip_mentions(text: &str) -> String {
    LEADING_MENTIONS.replace(text, "").trim().to_string()
}

/// Whether `text` mentions the given user anywhere.
pub fn mentions_user(text: &str, user_id: &str) -> bool {
    text.contains(&format!("<@{user_id}>"))
}

/// Split text into chunks of at most `max_len` characters.
///
/// Breaks at the last newline before the limit when there is one, otherwise
/// hard-splits at the limit. Newlines at the split point are dropped.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_len {
        let limit = byte_offset(rest, max_len);
        let split = match rest[..limit].rfind('\n') {
            Some(pos) if pos > 0 => pos,
            _ => limit,
        };
        chunks.push(rest[..split].to_string());
        rest = rest[split..].trim_start_matches('\n');
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Byte index of the `n`th character (or the end of the string).
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_single_mention() {
        assert_eq!(strip_mentions("<@U12345ABC> hello world"), "hello world");
    }

    #[test]
    fn strip_multiple_mentions() {
        assert_eq!(strip_mentions("<@U111> <@U222> do something"), "do something");
    }

    #[test]
    fn strip_no_mention_unchanged() {
        assert_eq!(strip_mentions("no mention here"), "no mention here");
        assert_eq!(strip_mentions(""), "");
    }

    #[test]
    fn strip_mention_only() {
        assert_eq!(strip_mentions("<@U12345ABC>"), "");
    }

    #[test]
    fn strip_bot_and_workspace_mentions() {
        assert_eq!(strip_mentions("<@B12345ABC> hello"), "hello");
        assert_eq!(strip_mentions("<@W12345ABC> hello"), "hello");
    }

    #[test]
    fn strip_keeps_inline_mentions() {
        assert_eq!(
            strip_mentions("<@U1> ask <@U2> about it"),
            "ask <@U2> about it"
        );
        assert_eq!(strip_mentions("<#C123> hi"), "<#C123> hi");
    }

    #[test]
    fn detects_user_mention() {
        assert!(mentions_user("hey <@UBOT> look", "UBOT"));
        assert!(!mentions_user("hey <@UOTHER>", "UBOT"));
    }

    #[test]
    fn split_short_text() {
        assert_eq!(split_message("hello", SLACK_MSG_LIMIT), vec!["hello"]);
        assert!(split_message("", SLACK_MSG_LIMIT).is_empty());
    }

    #[test]
    fn split_prefers_newlines() {
        let text = format!("{}\n{}", "a".repeat(3000), "b".repeat(3000));
        let chunks = split_message(&text, SLACK_MSG_LIMIT);
        assert_eq!(chunks, vec!["a".repeat(3000), "b".repeat(3000)]);
    }

    #[test]
    fn split_hard_without_newline() {
        let text = "x".repeat(9000);
        let chunks = split_message(&text, SLACK_MSG_LIMIT);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 4000);
        assert_eq!(chunks[1].len(), 4000);
        assert_eq!(chunks[2].len(), 1000);
    }

    #[test]
    fn split_drops_run_of_newlines() {
        let text = "aaaa\n\n\nbbbb";
        assert_eq!(split_message(text, 5), vec!["aaaa", "bbbb"]);
    }

    #[test]
    fn split_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 4);
        assert_eq!(chunks, vec!["éééé", "éééé", "éé"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }
}
