//! Image placeholders for images the model has already seen.
//!
//! Every image part except those in the final message is replaced with a
//! short text stand-in. When the model described the image in its next
//! reply, the first sentence of that reply becomes the description. This is
//! a heuristic that assumes the model talks about an image right after
//! seeing it; nothing depends on the exact wording.

use crate::{ChatMessage, ContentPart, MessageContent};

/// Used when no description can be borrowed from a later reply.
pub const GENERIC_IMAGE_PLACEHOLDER: &str = "[Image previously shared]";

const MIN_SENTENCE_CHARS: usize = 10;
const MAX_SENTENCE_CHARS: usize = 100;
const FALLBACK_PREVIEW_CHARS: usize = 80;

/// Replace images in all messages but the last. Returns the number of image
/// parts replaced.
pub fn replace_images(messages: &mut [ChatMessage]) -> usize {
    let Some(last) = messages.len().checked_sub(1) else {
        return 0;
    };

    let mut replaced = 0;
    for i in 0..last {
        let has_images = match &messages[i] {
            ChatMessage::User(u) => matches!(
                &u.content,
                MessageContent::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::Image { .. }))
            ),
            _ => false,
        };
        if !has_images {
            continue;
        }

        let placeholder = match describe_from_reply(&messages[i + 1..]) {
            Some(desc) => format!("[Image: {desc}]"),
            None => GENERIC_IMAGE_PLACEHOLDER.to_string(),
        };

        if let ChatMessage::User(u) = &mut messages[i]
            && let MessageContent::Parts(parts) = &mut u.content
        {
            for part in parts.iter_mut() {
                if matches!(part, ContentPart::Image { .. }) {
                    *part = ContentPart::Text {
                        text: placeholder.clone(),
                    };
                    replaced += 1;
                }
            }
        }
    }
    replaced
}

/// Borrow a description from the next assistant reply in `following`. A
/// reply without visible text yields no description; later turns are never
/// consulted.
fn describe_from_reply(following: &[ChatMessage]) -> Option<String> {
    let text = following.iter().find_map(|m| m.as_assistant())?.text()?;
    describe(&text)
}

/// First sentence if it is 10-100 characters, otherwise the first 80
/// characters with an ellipsis.
fn describe(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let sentence = first_sentence(text);
    let sentence_chars = sentence.chars().count();
    if (MIN_SENTENCE_CHARS..=MAX_SENTENCE_CHARS).contains(&sentence_chars) {
        return Some(sentence.to_string());
    }

    if text.chars().count() <= FALLBACK_PREVIEW_CHARS {
        return Some(text.to_string());
    }
    let preview: String = text.chars().take(FALLBACK_PREVIEW_CHARS).collect();
    Some(format!("{}…", preview.trim_end()))
}

fn first_sentence(text: &str) -> &str {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        match c {
            '\n' => return text.get(..i).unwrap_or(text).trim_end(),
            '。' | '！' | '？' => return text.get(..end).unwrap_or(text),
            '.' | '!' | '?' => {
                if chars.peek().is_none_or(|(_, next)| next.is_whitespace()) {
                    return text.get(..end).unwrap_or(text);
                }
            }
            _ => {}
        }
    }
    text
}
