//! Refiner: the temporal/trimming overlay applied before every model call
//! (SPEC_FULL §4.2).
//!
//! Builds the view of the conversation actually sent to the model: the
//! system message is always kept; any tool-call/tool-result pair missing
//! its other half is dropped entirely (never send a dangling tool call or
//! an orphaned tool result); the remainder is walked newest-to-oldest,
//! admitting messages against a `len(content)/4` token-budget proxy until
//! the budget is exhausted, admitting an assistant-with-tool-calls message
//! and every one of its tool results as one atomic unit, and never
//! admitting a lone tool message without its assistant call. The admitted
//! set is finally re-sorted back into `created_at` order with the system
//! message prepended.
//!
//! The trimming overlay (SPEC_FULL §4.2's "Trimming overlay" paragraph) is
//! applied last, to the admitted view only: the Message Store log always
//! keeps the full original tool content, so re-refining with a different
//! cap or budget recovers it. An admitted tool message over `trim_cap_chars`
//! is replaced by a preview plus a `[temporal-memory_recall(<key>)]` marker,
//! keyed by the message's own id; the full text is stashed in the Temporal
//! Store. Tool messages answering the temporal-memory provider itself are
//! exempt (`TemporalStore::trim_tool_response` already encodes that rule).

use std::collections::{HashMap, HashSet};

use sa_domain::message::Message;

use crate::temporal::TemporalStore;

/// Approximate tokens as `chars / 4`, matching the budget proxy used
/// throughout SPEC_FULL §4.2 rather than a real tokenizer.
fn estimate_tokens(message: &Message) -> usize {
    (message.content_chars() / 4).max(1)
}

/// The provider id that answered `tool_call_id`, derived from the
/// originating assistant message's `tool_calls[*].function.name` prefix
/// (SPEC_FULL §4.5's `<provider_id>__<tool_name>` namespacing). Empty if the
/// call id is unknown.
fn provider_id_for_call(
    messages: &[Message],
    assistant_index: &HashMap<&str, usize>,
    tool_call_id: Option<&str>,
) -> String {
    tool_call_id
        .and_then(|tcid| assistant_index.get(tcid))
        .and_then(|&idx| messages[idx].tool_calls.as_ref())
        .and_then(|calls| calls.iter().find(|c| tool_call_id == Some(c.id.as_str())))
        .map(|c| c.function.name.split("__").next().unwrap_or_default().to_string())
        .unwrap_or_default()
}

/// Produce the refined transcript to send to the model, trimming oversized
/// tool responses into the Temporal Store as it goes.
pub fn refine(
    messages: &[Message],
    temporal: &TemporalStore,
    token_budget_chars: usize,
    trim_cap_chars: usize,
) -> Vec<Message> {
    let token_budget = (token_budget_chars / 4).max(1);

    let system = messages.iter().find(|m| m.is_system()).cloned();

    // Index assistant tool-calls by id and tool responses by tool_call_id.
    let mut assistant_index: HashMap<&str, usize> = HashMap::new();
    let mut tool_index: HashMap<&str, usize> = HashMap::new();
    for (idx, message) in messages.iter().enumerate() {
        if let Some(calls) = &message.tool_calls {
            for call in calls {
                assistant_index.insert(call.id.as_str(), idx);
            }
        }
        if let Some(tool_call_id) = &message.tool_call_id {
            tool_index.insert(tool_call_id.as_str(), idx);
        }
    }

    // A call id is complete only if both its assistant call and its tool
    // result are present; incomplete pairs are excluded on both sides.
    let mut complete_call_ids: HashSet<&str> = HashSet::new();
    for call_id in assistant_index.keys() {
        if tool_index.contains_key(call_id) {
            complete_call_ids.insert(call_id);
        }
    }

    let excluded_indices: HashSet<usize> = messages
        .iter()
        .enumerate()
        .filter_map(|(idx, message)| {
            if message.is_system() {
                return None;
            }
            if let Some(calls) = &message.tool_calls {
                let has_incomplete = calls.iter().any(|c| !complete_call_ids.contains(c.id.as_str()));
                if has_incomplete {
                    return Some(idx);
                }
            }
            if let Some(tool_call_id) = &message.tool_call_id {
                if !complete_call_ids.contains(tool_call_id.as_str()) {
                    return Some(idx);
                }
            }
            None
        })
        .collect();

    // Walk newest-to-oldest, admitting whole units against the budget.
    let mut admitted: HashSet<usize> = HashSet::new();
    let mut spent = 0usize;

    for (idx, message) in messages.iter().enumerate().rev() {
        if message.is_system() || excluded_indices.contains(&idx) {
            continue;
        }
        if admitted.contains(&idx) {
            continue;
        }

        // Never admit a lone tool message; it rides along with its
        // assistant tool-call group below.
        if message.is_tool() {
            continue;
        }

        let mut unit_indices = vec![idx];
        let mut unit_cost = estimate_tokens(message);

        if let Some(calls) = &message.tool_calls {
            for call in calls {
                if let Some(&tool_idx) = tool_index.get(call.id.as_str()) {
                    unit_indices.push(tool_idx);
                    unit_cost += estimate_tokens(&messages[tool_idx]);
                }
            }
        }

        if spent + unit_cost > token_budget && !admitted.is_empty() {
            break;
        }

        for i in unit_indices {
            admitted.insert(i);
        }
        spent += unit_cost;
    }

    let mut ordered: Vec<&Message> = admitted
        .into_iter()
        .map(|idx| &messages[idx])
        .collect();
    ordered.sort_by_key(|m| m.meta.created_at);

    let mut refined = Vec::with_capacity(ordered.len() + 1);
    if let Some(system) = system {
        refined.push(system);
    }
    for message in ordered {
        let mut message = message.clone();
        if message.is_tool() {
            if let Some(content) = message.content.take() {
                let provider_id = provider_id_for_call(messages, &assistant_index, message.tool_call_id.as_deref());
                message.content = Some(temporal.trim_tool_response(
                    &message.meta.id,
                    &provider_id,
                    &content,
                    trim_cap_chars,
                ));
            }
        }
        refined.push(message);
    }
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::message::{MessageMeta, Role, ToolCall};

    fn msg(role: Role, content: Option<&str>, created_at: i64) -> Message {
        Message {
            role,
            content: content.map(str::to_string),
            tool_calls: None,
            tool_call_id: None,
            meta: MessageMeta {
                id: format!("m{created_at}"),
                created_at,
                parent_id: None,
                cycle: 0,
            },
        }
    }

    const NO_TRIM: usize = usize::MAX;

    #[test]
    fn keeps_system_message_regardless_of_budget() {
        let messages = vec![msg(Role::System, Some("sys"), 0), msg(Role::User, Some("hi"), 1)];
        let refined = refine(&messages, &TemporalStore::new(), 1, NO_TRIM);
        assert!(refined[0].is_system());
    }

    #[test]
    fn drops_incomplete_tool_call_pair() {
        let mut assistant = msg(Role::Assistant, None, 1);
        assistant.tool_calls = Some(vec![ToolCall::new("c1", "p__x", "{}")]);
        let messages = vec![msg(Role::System, Some("sys"), 0), assistant];

        let refined = refine(&messages, &TemporalStore::new(), 10_000, NO_TRIM);
        assert_eq!(refined.len(), 1); // only the system message survives
    }

    #[test]
    fn admits_complete_tool_pair_atomically() {
        let mut assistant = msg(Role::Assistant, None, 1);
        assistant.tool_calls = Some(vec![ToolCall::new("c1", "p__x", "{}")]);
        let mut tool_msg = msg(Role::Tool, Some("result"), 2);
        tool_msg.tool_call_id = Some("c1".into());

        let messages = vec![msg(Role::System, Some("sys"), 0), assistant, tool_msg];
        let refined = refine(&messages, &TemporalStore::new(), 10_000, NO_TRIM);
        assert_eq!(refined.len(), 3);
        assert!(refined.iter().any(|m| m.is_tool()));
    }

    #[test]
    fn never_admits_lone_tool_message() {
        let mut orphan_tool = msg(Role::Tool, Some("orphan"), 1);
        orphan_tool.tool_call_id = Some("nonexistent".into());
        let messages = vec![msg(Role::System, Some("sys"), 0), orphan_tool];
        let refined = refine(&messages, &TemporalStore::new(), 10_000, NO_TRIM);
        assert!(!refined.iter().any(|m| m.is_tool()));
    }

    #[test]
    fn newest_messages_admitted_first_under_tight_budget() {
        let messages = vec![
            msg(Role::System, Some("sys"), 0),
            msg(Role::User, Some("a".repeat(400).as_str()), 1),
            msg(Role::User, Some("b".repeat(400).as_str()), 2),
        ];
        // Budget only large enough for one of the two user messages.
        let refined = refine(&messages, &TemporalStore::new(), 500, NO_TRIM);
        let user_contents: Vec<_> = refined.iter().filter(|m| m.is_user()).collect();
        assert_eq!(user_contents.len(), 1);
        assert_eq!(user_contents[0].content.as_deref(), Some("b".repeat(400).as_str()));
    }

    #[test]
    fn reorders_admitted_messages_by_created_at() {
        let messages = vec![
            msg(Role::System, Some("sys"), 0),
            msg(Role::User, Some("first"), 1),
            msg(Role::Assistant, Some("second"), 2),
        ];
        let refined = refine(&messages, &TemporalStore::new(), 10_000, NO_TRIM);
        let created_ats: Vec<_> = refined.iter().map(|m| m.meta.created_at).collect();
        let mut sorted = created_ats.clone();
        sorted.sort();
        assert_eq!(created_ats, sorted);
    }

    #[test]
    fn oversized_tool_response_is_trimmed_with_recoverable_marker() {
        let mut assistant = msg(Role::Assistant, None, 1);
        assistant.tool_calls = Some(vec![ToolCall::new("c1", "fs__read", "{}")]);
        let long_content = "x".repeat(500);
        let mut tool_msg = msg(Role::Tool, Some(long_content.as_str()), 2);
        tool_msg.tool_call_id = Some("c1".into());
        let tool_msg_id = tool_msg.meta.id.clone();

        let messages = vec![msg(Role::System, Some("sys"), 0), assistant, tool_msg];
        let temporal = TemporalStore::new();
        let refined = refine(&messages, &temporal, 10_000, 50);

        let refined_tool = refined.iter().find(|m| m.is_tool()).unwrap();
        let refined_content = refined_tool.content.as_deref().unwrap();
        assert!(refined_content.len() < long_content.len());
        assert!(refined_content.contains(&format!("[temporal-memory_recall({tool_msg_id})]")));

        let recovered = temporal.get(&[tool_msg_id]);
        assert_eq!(recovered.values().next().unwrap().as_deref(), Some(long_content.as_str()));
    }

    #[test]
    fn temporal_memory_tool_responses_are_exempt_from_trimming() {
        let mut assistant = msg(Role::Assistant, None, 1);
        assistant.tool_calls = Some(vec![ToolCall::new("c1", "temporal-memory__recall", "{}")]);
        let long_content = "x".repeat(500);
        let mut tool_msg = msg(Role::Tool, Some(long_content.as_str()), 2);
        tool_msg.tool_call_id = Some("c1".into());

        let messages = vec![msg(Role::System, Some("sys"), 0), assistant, tool_msg];
        let refined = refine(&messages, &TemporalStore::new(), 10_000, 50);

        let refined_tool = refined.iter().find(|m| m.is_tool()).unwrap();
        assert_eq!(refined_tool.content.as_deref(), Some(long_content.as_str()));
    }
}
