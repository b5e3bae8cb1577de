//! Level-keyed size caps: message-count ceilings and truncation of large
//! file-write arguments.
//!
//! A `write_file` call that created a 40KB file keeps those 40KB in history
//! as the call's `content` argument. Once the model has moved on, the bytes
//! are dead weight; the tool result already records what happened.

use super::budget::CompressionLevel;
use crate::{AssistantPart, ChatMessage};
use std::collections::HashSet;

/// Per-level message-count ceilings, indexed by level. Level 0 never trims.
pub const MESSAGE_CEILINGS: [usize; 5] = [60, 45, 30, 15, 10];

/// Per-level character thresholds for file-write arguments, indexed by
/// level. Level 0 never truncates.
pub const ARGUMENT_THRESHOLDS: [usize; 5] = [usize::MAX, 10_000, 2_000, 500, 200];

/// Marker line appended to truncated argument values. Also used to detect
/// values that were already truncated.
pub const TRUNCATED_TAG: &str = "\n[truncated: ";

/// Effective message limit for `level`: `min(base, ceiling)`. `None` at
/// level 0.
pub fn message_limit(level: CompressionLevel, base: usize) -> Option<usize> {
    if level == CompressionLevel::L0 {
        return None;
    }
    Some(base.min(MESSAGE_CEILINGS[level.index()]).max(1))
}

/// Keep only the newest `limit` messages. Returns the number dropped.
pub fn trim_to_limit(messages: &mut Vec<ChatMessage>, limit: usize) -> usize {
    let limit = limit.max(1);
    if messages.len() <= limit {
        return 0;
    }
    let dropped = messages.len() - limit;
    messages.drain(..dropped);
    dropped
}

/// Truncate oversized fields of file-writing tool calls.
///
/// The most recent assistant message is exempt: the user may still be
/// looking at it. Returns the number of distinct tool calls changed.
pub fn truncate_file_write_arguments(
    messages: &mut [ChatMessage],
    level: CompressionLevel,
    file_write_tools: &HashSet<String>,
    fields: &[String],
) -> usize {
    let threshold = ARGUMENT_THRESHOLDS[level.index()];
    if threshold == usize::MAX {
        return 0;
    }

    let exempt = messages
        .iter()
        .rposition(|m| matches!(m, ChatMessage::Assistant(_)));

    let mut changed: HashSet<String> = HashSet::new();
    for (i, msg) in messages.iter_mut().enumerate() {
        if Some(i) == exempt {
            continue;
        }
        let ChatMessage::Assistant(assistant) = msg else {
            continue;
        };

        for call in assistant.tool_calls.iter_mut().flatten() {
            if file_write_tools.contains(&call.name)
                && truncate_fields(&mut call.arguments, fields, threshold)
            {
                changed.insert(call.id.clone());
            }
        }
        for part in assistant.parts.iter_mut() {
            if let AssistantPart::ToolCall {
                tool_call_id,
                name,
                arguments,
            } = part
                && file_write_tools.contains(name.as_str())
                && truncate_fields(arguments, fields, threshold)
            {
                changed.insert(tool_call_id.clone());
            }
        }
    }
    changed.len()
}

fn truncate_fields(arguments: &mut serde_json::Value, fields: &[String], threshold: usize) -> bool {
    let Some(obj) = arguments.as_object_mut() else {
        return false;
    };
    let mut changed = false;
    for field in fields {
        if let Some(serde_json::Value::String(value)) = obj.get_mut(field)
            && let Some(truncated) = truncate_value(value, threshold)
        {
            *value = truncated;
            changed = true;
        }
    }
    changed
}

/// Truncate `value` to at most `threshold` characters, marker included. The
/// marker records the original length.
///
/// Returns `None` when no change is needed or when the marker would not fit
/// in less space than the value already takes. A second pass at the same
/// threshold is therefore a no-op.
pub fn truncate_value(value: &str, threshold: usize) -> Option<String> {
    let (body, original) = split_truncated(value);
    let body_chars = body.chars().count();
    if body_chars <= threshold {
        return None;
    }
    let marker = format!("{TRUNCATED_TAG}{} chars]", original.unwrap_or(body_chars));
    let marker_chars = marker.chars().count();
    let head_chars = threshold.saturating_sub(marker_chars);
    if head_chars + marker_chars >= value.chars().count() {
        return None;
    }
    let head: String = body.chars().take(head_chars).collect();
    Some(head + &marker)
}

/// Split a possibly-truncated value into its body and the original length
/// recorded in the marker.
fn split_truncated(value: &str) -> (&str, Option<usize>) {
    if let Some(pos) = value.rfind(TRUNCATED_TAG)
        && let Some(count) = value
            .get(pos + TRUNCATED_TAG.len()..)
            .and_then(|rest| rest.strip_suffix(" chars]"))
            .and_then(|n| n.parse::<usize>().ok())
    {
        return (value.get(..pos).unwrap_or(value), Some(count));
    }
    (value, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;
    use serde_json::json;

    fn tools() -> HashSet<String> {
        ["write_file", "edit_file"].iter().map(|s| s.to_string()).collect()
    }

    fn fields() -> Vec<String> {
        vec!["content".into(), "old_string".into(), "new_string".into()]
    }

    fn write_call(id: &str, size: usize) -> ChatMessage {
        ChatMessage::assistant_tool_calls(vec![ToolCall::new(
            id,
            "write_file",
            json!({"path": "a.txt", "content": "x".repeat(size)}),
        )])
    }

    fn content_len(msg: &ChatMessage) -> usize {
        msg.as_assistant().unwrap().tool_calls.as_ref().unwrap()[0]
            .arg_str("content")
            .unwrap()
            .len()
    }

    #[test]
    fn limits_follow_ceilings() {
        assert_eq!(message_limit(CompressionLevel::L0, 60), None);
        assert_eq!(message_limit(CompressionLevel::L1, 60), Some(45));
        assert_eq!(message_limit(CompressionLevel::L4, 60), Some(10));
        assert_eq!(message_limit(CompressionLevel::L1, 20), Some(20));
    }

    #[test]
    fn trim_keeps_newest() {
        let mut messages: Vec<ChatMessage> =
            (0..5).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        let dropped = trim_to_limit(&mut messages, 2);
        assert_eq!(dropped, 3);
        assert_eq!(messages, vec![ChatMessage::user("m3"), ChatMessage::user("m4")]);
    }

    #[test]
    fn truncates_old_writes_but_not_latest_assistant() {
        let mut messages = vec![write_call("c1", 5_000), write_call("c2", 5_000)];
        let n = truncate_file_write_arguments(&mut messages, CompressionLevel::L2, &tools(), &fields());
        assert_eq!(n, 1);
        assert!(content_len(&messages[0]) < 5_000);
        assert_eq!(content_len(&messages[1]), 5_000);
    }

    #[test]
    fn level_one_threshold_is_generous() {
        let mut messages = vec![write_call("c1", 5_000), ChatMessage::assistant_text("done")];
        let n = truncate_file_write_arguments(&mut messages, CompressionLevel::L1, &tools(), &fields());
        assert_eq!(n, 0);
    }

    #[test]
    fn non_write_tools_untouched() {
        let mut messages = vec![
            ChatMessage::assistant_tool_calls(vec![ToolCall::new(
                "c1",
                "shell",
                json!({"content": "y".repeat(5_000)}),
            )]),
            ChatMessage::assistant_text("done"),
        ];
        let n = truncate_file_write_arguments(&mut messages, CompressionLevel::L4, &tools(), &fields());
        assert_eq!(n, 0);
    }

    #[test]
    fn second_pass_is_noop() {
        let once = truncate_value(&"z".repeat(1_000), 200).unwrap();
        assert!(once.ends_with("[truncated: 1000 chars]"));
        assert_eq!(truncate_value(&once, 200), None);
    }

    #[test]
    fn deeper_level_retruncates_and_keeps_original_length() {
        let l2 = truncate_value(&"z".repeat(5_000), 2_000).unwrap();
        let l4 = truncate_value(&l2, 200).unwrap();
        assert!(l4.len() < l2.len());
        assert!(l4.ends_with("[truncated: 5000 chars]"));
    }

    #[test]
    fn multibyte_values_truncate_on_char_boundaries() {
        let value = "é".repeat(300);
        let out = truncate_value(&value, 200).unwrap();
        assert!(out.starts_with(&"é".repeat(150)));
        assert_eq!(out.chars().count(), 200);
    }

    #[test]
    fn just_over_threshold_never_grows() {
        let value = "x".repeat(201);
        let out = truncate_value(&value, 200).unwrap();
        assert_eq!(out.chars().count(), 200);
        assert!(out.ends_with("[truncated: 201 chars]"));
        assert_eq!(truncate_value(&out, 200), None);
    }

    #[test]
    fn marker_wider_than_threshold_leaves_value_alone() {
        let value = "x".repeat(12);
        assert_eq!(truncate_value(&value, 10), None);
    }

    #[test]
    fn output_fits_threshold_at_every_level() {
        for threshold in ARGUMENT_THRESHOLDS.into_iter().filter(|t| *t != usize::MAX) {
            for size in [threshold + 1, threshold + 50, threshold * 3] {
                let out = truncate_value(&"y".repeat(size), threshold).unwrap();
                assert!(out.chars().count() <= threshold, "{size} at {threshold}");
                assert!(out.chars().count() < size);
            }
        }
    }
}
