//! Heuristic token estimation.
//!
//! No tokenizer is loaded. CJK scripts pack far more meaning per character
//! than Latin text, so they are counted separately: one token per 1.5 CJK
//! characters, one token per 4 characters for everything else. Images are
//! charged a flat conservative amount because their dimensions are unknown
//! here.

use crate::{AssistantPart, ChatMessage, ContentPart, MessageContent};

/// Characters per token for non-CJK text.
pub const CHARS_PER_TOKEN: f64 = 4.0;

/// Characters per token for CJK text.
pub const CJK_CHARS_PER_TOKEN: f64 = 1.5;

/// Flat estimate for one image part.
pub const IMAGE_TOKEN_ESTIMATE: usize = 1600;

/// Whether `c` belongs to a CJK script (Han, kana, Hangul, CJK punctuation
/// and fullwidth forms).
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x303F   // CJK symbols and punctuation
        | 0x3040..=0x30FF // Hiragana, Katakana
        | 0x3400..=0x4DBF // CJK extension A
        | 0x4E00..=0x9FFF // CJK unified ideographs
        | 0xAC00..=0xD7AF // Hangul syllables
        | 0xF900..=0xFAFF // CJK compatibility ideographs
        | 0xFF00..=0xFFEF // Halfwidth and fullwidth forms
        | 0x20000..=0x2A6DF // CJK extension B
    )
}

/// Estimate the token count of a string.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
        if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });
    (cjk as f64 / CJK_CHARS_PER_TOKEN + other as f64 / CHARS_PER_TOKEN).ceil() as usize
}

/// Estimate a list of content parts. Text goes through [`estimate_tokens`],
/// images use [`IMAGE_TOKEN_ESTIMATE`], everything else is charged by its
/// serialized size.
pub fn estimate_content_tokens(parts: &[ContentPart]) -> usize {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => estimate_tokens(text),
            ContentPart::Image { .. } => IMAGE_TOKEN_ESTIMATE,
            other => estimate_serialized(other),
        })
        .sum()
}

/// Estimate one message.
///
/// Tool results already replaced by compression count as zero: the sentinel
/// is negligible next to the body it stands in for.
pub fn estimate_message_tokens(message: &ChatMessage) -> usize {
    match message {
        ChatMessage::User(u) => match &u.content {
            MessageContent::Text(text) => estimate_tokens(text),
            MessageContent::Parts(parts) => estimate_content_tokens(parts),
        },
        ChatMessage::Assistant(a) => {
            let content = a.content.as_deref().map_or(0, estimate_tokens);
            let calls: usize = a.tool_calls.iter().flatten().map(estimate_serialized).sum();
            let parts: usize = a
                .parts
                .iter()
                .map(|p| match p {
                    AssistantPart::Text { text } | AssistantPart::Reasoning { text } => {
                        estimate_tokens(text)
                    }
                    tool_call => estimate_serialized(tool_call),
                })
                .sum();
            content + calls + parts
        }
        ChatMessage::Tool(t) => {
            if t.compacted_at.is_some() {
                0
            } else {
                estimate_tokens(&t.content)
            }
        }
        ChatMessage::Checkpoint(_) => 0,
    }
}

/// Estimate a whole history.
pub fn estimate_messages_tokens(history: &[ChatMessage]) -> usize {
    history.iter().map(estimate_message_tokens).sum()
}

fn estimate_serialized<T: serde::Serialize>(value: &T) -> usize {
    serde_json::to_string(value).map_or(0, |s| estimate_tokens(&s))
}
