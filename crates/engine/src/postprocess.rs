//! Reply post-processing for generated answers.
//!
//! Keeps model output in the house style: no leading filler, one list item
//! per line, no repeated sentences, and a closing question offering the
//! next step.

use regex_lite::Regex;
use std::sync::LazyLock;

pub const FOLLOW_UP: &str = "Would you like instructions to set this up or should I escalate this?";

/// Only the last this-many characters are checked for an existing question.
const QUESTION_TAIL_CHARS: usize = 200;
const MIN_FOLLOW_UP_LEN: usize = 20;

// Compiled once; a pattern that fails to compile disables its step.
static FILLER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(excellent|great|okay|sure|thanks|thank you|perfect|alright)\b[!.,]?\s*").ok()
});

static INLINE_BULLET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s*[*\x{2022}]\s*").ok());

static INLINE_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([^\s])[ \t]+(\d{1,2}\.)[ \t]+").ok());

fn replace_all(re: &Option<Regex>, text: &str, replacement: &str) -> String {
    match re {
        Some(re) => re.replace_all(text, replacement).into_owned(),
        None => text.to_string(),
    }
}

/// Clean up a raw generated reply.
pub fn postprocess_reply(raw: &str) -> String {
    let mut reply = raw.trim().to_string();
    if reply.is_empty() {
        return reply;
    }

    if let Some(found) = FILLER.as_ref().and_then(|re| re.find(&reply)) {
        // Only strip when something remains after the filler
        if found.end() < reply.len() {
            reply = reply[found.end()..].trim().to_string();
        }
    }

    reply = reply.replace("\r\n", "\n").replace('\r', "\n");
    reply = reply.replace("**", "");
    reply = replace_all(&INLINE_BULLET, &reply, "\n- ");
    reply = replace_all(&INLINE_NUMBER, &reply, "$1\n$2 ");

    reply = reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    reply = dedupe_sentences(&reply);

    if needs_follow_up(&reply) {
        reply.push_str("\n\n");
        reply.push_str(FOLLOW_UP);
    }

    reply
}

fn needs_follow_up(reply: &str) -> bool {
    let char_count = reply.chars().count();
    let tail: String = reply
        .chars()
        .skip(char_count.saturating_sub(QUESTION_TAIL_CHARS))
        .collect();
    !tail.contains('?')
        && !reply.to_lowercase().contains("escalat")
        && char_count > MIN_FOLLOW_UP_LEN
}

/// Drop a sentence (or line) that repeats the one right before it.
pub fn dedupe_sentences(text: &str) -> String {
    let mut previous: Option<String> = None;
    let mut lines = Vec::new();

    for line in text.lines() {
        let mut kept = Vec::new();
        for sentence in split_sentences(line) {
            let key = sentence.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            if previous.as_deref() == Some(key.as_str()) {
                continue;
            }
            previous = Some(key);
            kept.push(sentence.trim());
        }
        if !kept.is_empty() {
            lines.push(kept.join(" "));
        }
    }

    lines.join("\n")
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(line: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_i, next_c)) = chars.peek() {
                if next_c.is_whitespace() {
                    sentences.push(&line[start..next_i]);
                    start = next_i;
                }
            } else {
                sentences.push(&line[start..i + c.len_utf8()]);
                start = line.len();
            }
        }
    }
    if start < line.len() {
        sentences.push(&line[start..]);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_filler() {
        let out = postprocess_reply("Great! Our store opens at 9am. Anything else?");
        assert_eq!(out, "Our store opens at 9am. Anything else?");

        let out = postprocess_reply("Thank you, the refund is on its way. Need more help?");
        assert!(out.starts_with("the refund"));
    }

    #[test]
    fn filler_needs_a_word_boundary() {
        let out = postprocess_reply("Surely you can pay by card. Anything else?");
        assert!(out.starts_with("Surely"));
    }

    #[test]
    fn filler_alone_is_kept() {
        assert_eq!(postprocess_reply("Sure!"), "Sure!");
    }

    #[test]
    fn inline_bullets_become_lines() {
        let out = postprocess_reply("Options: * Email * Phone * Chat. Which one?");
        assert_eq!(out, "Options:\n- Email\n- Phone\n- Chat. Which one?");
    }

    #[test]
    fn numbered_items_get_own_lines() {
        let out = postprocess_reply("Steps: 1. Open settings 2. Tap reset. Done?");
        assert_eq!(out, "Steps:\n1. Open settings\n2. Tap reset. Done?");
    }

    #[test]
    fn version_numbers_are_left_alone() {
        let out = postprocess_reply("Update to version 2.0 first. Does that help?");
        assert_eq!(out, "Update to version 2.0 first. Does that help?");
    }

    #[test]
    fn appends_follow_up_when_no_question() {
        let out = postprocess_reply("Your order ships within two business days.");
        assert!(out.ends_with(FOLLOW_UP));
    }

    #[test]
    fn no_follow_up_for_short_or_escalating_replies() {
        assert_eq!(postprocess_reply("Done."), "Done.");
        let out = postprocess_reply("I will escalate this to our billing team right away.");
        assert!(!out.contains(FOLLOW_UP));
    }

    #[test]
    fn blank_lines_and_crlf_are_normalised() {
        let out = postprocess_reply("Line one.\r\n\r\n\r\nLine two?");
        assert_eq!(out, "Line one.\nLine two?");
    }

    #[test]
    fn repeated_sentences_are_removed() {
        let out = dedupe_sentences("We open at 9. We open at 9. We close at 5.");
        assert_eq!(out, "We open at 9. We close at 5.");

        let out = dedupe_sentences("Same line.\nsame line.\nNew line.");
        assert_eq!(out, "Same line.\nNew line.");
    }

    #[test]
    fn split_keeps_trailing_fragment() {
        assert_eq!(split_sentences("One. Two"), vec!["One.", " Two"]);
        assert_eq!(split_sentences("v1.2 works!"), vec!["v1.2 works!"]);
    }
}
