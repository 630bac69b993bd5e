// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Quick-title / slow-title session naming.
//!
//! The quick title is synchronous and free (first 8 words of the opening
//! message); the slow title is an async LLM summary that overwrites it if it
//! completes within the configured timeout. Neither path runs for a session
//! whose first message is a slash command.

use async_trait::async_trait;

const QUICK_TITLE_WORD_COUNT: usize = 8;

/// Generates a one-line session summary for the slow-title path. Implemented
/// by whichever component holds an `Arc<ModelGateway>` (kept out of
/// `aria-core` itself so the Session Manager never depends on transport or
/// provider specifics).
#[async_trait]
pub trait TitleSummarizer: Send + Sync {
    async fn summarize(&self, first_message: &str) -> anyhow::Result<String>;
}

/// First 8 whitespace-separated words, with an ellipsis if truncated.
pub fn quick_title(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= QUICK_TITLE_WORD_COUNT {
        words.join(" ")
    } else {
        format!("{}…", words[..QUICK_TITLE_WORD_COUNT].join(" "))
    }
}

/// A session whose first message is command-and-control traffic skips the
/// slow-title path entirely; the quick title (the literal command text) is
/// permanent.
pub fn is_slash_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_title_short_text_unchanged() {
        assert_eq!(quick_title("hello world"), "hello world");
    }

    #[test]
    fn quick_title_truncates_long_text_with_ellipsis() {
        let text = "one two three four five six seven eight nine ten";
        let title = quick_title(text);
        assert_eq!(title, "one two three four five six seven eight…");
    }

    #[test]
    fn quick_title_collapses_internal_whitespace() {
        assert_eq!(quick_title("hello    world"), "hello world");
    }

    #[test]
    fn quick_title_empty_text_is_empty() {
        assert_eq!(quick_title(""), "");
    }

    #[test]
    fn slash_command_detected() {
        assert!(is_slash_command("/rt @a @b topic"));
        assert!(is_slash_command("  /help"));
        assert!(!is_slash_command("hello /not/a/command/at/the/start"));
    }
}
