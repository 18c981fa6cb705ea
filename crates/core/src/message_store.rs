//! Conversation Message Store (SPEC_FULL §3, §4.1).
//!
//! Holds the append-only conversation log and enforces its invariants: at
//! most one system message, and only at position 0; every tool message's
//! `tool_call_id` references an earlier assistant tool-call id in the same
//! log; tool-call ids are unique; messages are totally ordered by
//! non-decreasing `created_at`. Every mutation broadcasts a snapshot to
//! subscribers, replacing the callback-list observer discipline a
//! Python-side context manager uses with a `tokio::sync::broadcast` channel.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use sa_domain::error::{Error, Result};
use sa_domain::message::{Message, MessageMeta, Role, ToolCall};
use tokio::sync::broadcast;

/// Snapshot of the log broadcast to observers after every mutation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub messages: Vec<Message>,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct MessageStore {
    messages: Mutex<Vec<Message>>,
    observers: broadcast::Sender<Snapshot>,
    /// Guarantees strictly increasing `created_at` even when the wall clock
    /// doesn't advance between two appends in the same millisecond.
    clock: AtomicI64,
}

impl MessageStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            messages: Mutex::new(Vec::new()),
            observers: tx,
            clock: AtomicI64::new(0),
        }
    }

    /// Subscribe to snapshots emitted after every mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.observers.subscribe()
    }

    fn next_created_at(&self) -> i64 {
        let now = now_millis();
        // Advance the shared clock monotonically so two appends in the same
        // millisecond still sort deterministically by `created_at`.
        loop {
            let prev = self.clock.load(Ordering::SeqCst);
            let next = if now > prev { now } else { prev + 1 };
            if self
                .clock
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }

    fn notify(&self, messages: &[Message]) {
        // A lagging or absent subscriber must never block a mutation.
        let _ = self.observers.send(Snapshot {
            messages: messages.to_vec(),
        });
    }

    /// Replace any existing system message and insert the new one at
    /// position 0 (SPEC_FULL §3: at most one system message, always first).
    pub fn set_system_message(&self, content: impl Into<String>) {
        let mut messages = self.messages.lock().unwrap();
        messages.retain(|m| !m.is_system());
        messages.insert(
            0,
            Message {
                role: Role::System,
                content: Some(content.into()),
                tool_calls: None,
                tool_call_id: None,
                meta: MessageMeta {
                    id: new_id(),
                    created_at: self.next_created_at(),
                    parent_id: None,
                    cycle: 0,
                },
            },
        );
        self.notify(&messages);
    }

    pub fn add_user_message(&self, content: impl Into<String>) -> String {
        self.push(Message {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            meta: MessageMeta {
                id: new_id(),
                created_at: self.next_created_at(),
                parent_id: None,
                cycle: 0,
            },
        })
    }

    pub fn add_assistant_message(&self, content: impl Into<String>) -> String {
        self.push(Message {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            meta: MessageMeta {
                id: new_id(),
                created_at: self.next_created_at(),
                parent_id: None,
                cycle: 0,
            },
        })
    }

    pub fn add_assistant_tool_calls(&self, tool_calls: Vec<ToolCall>) -> String {
        self.push(Message {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            meta: MessageMeta {
                id: new_id(),
                created_at: self.next_created_at(),
                parent_id: None,
                cycle: 0,
            },
        })
    }

    /// Append a tool result. Fails validation if `tool_call_id` doesn't
    /// reference an earlier assistant tool-call id already in the log
    /// (SPEC_FULL §3 pairing invariant).
    pub fn add_tool_result(&self, tool_call_id: impl Into<String>, content: impl Into<String>) -> Result<String> {
        let tool_call_id = tool_call_id.into();
        let mut messages = self.messages.lock().unwrap();
        if !has_matching_tool_call(&messages, &tool_call_id) {
            return Err(Error::Validation(format!(
                "tool_call_id '{tool_call_id}' does not reference any earlier assistant tool call"
            )));
        }
        let msg = Message {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id),
            meta: MessageMeta {
                id: new_id(),
                created_at: self.next_created_at(),
                parent_id: None,
                cycle: 0,
            },
        };
        let id = msg.meta.id.clone();
        messages.push(msg);
        self.notify(&messages);
        Ok(id)
    }

    /// Atomically append one assistant tool-call message plus all of its
    /// paired tool results, as the Agent Loop does per turn (SPEC_FULL
    /// §4.6). All-or-nothing: a mismatched pairing rolls back nothing added
    /// yet and returns an error before any push happens.
    pub fn append_turn(&self, assistant_tool_calls: Vec<ToolCall>, tool_results: Vec<(String, String)>) -> Result<()> {
        let call_ids: std::collections::HashSet<&str> =
            assistant_tool_calls.iter().map(|tc| tc.id.as_str()).collect();
        for (tool_call_id, _) in &tool_results {
            if !call_ids.contains(tool_call_id.as_str()) {
                return Err(Error::Validation(format!(
                    "tool result references call id '{tool_call_id}' not present in this turn's tool calls"
                )));
            }
        }

        let mut messages = self.messages.lock().unwrap();
        messages.push(Message {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(assistant_tool_calls),
            tool_call_id: None,
            meta: MessageMeta {
                id: new_id(),
                created_at: self.next_created_at(),
                parent_id: None,
                cycle: 0,
            },
        });
        for (tool_call_id, content) in tool_results {
            messages.push(Message {
                role: Role::Tool,
                content: Some(content),
                tool_calls: None,
                tool_call_id: Some(tool_call_id),
                meta: MessageMeta {
                    id: new_id(),
                    created_at: self.next_created_at(),
                    parent_id: None,
                    cycle: 0,
                },
            });
        }
        self.notify(&messages);
        Ok(())
    }

    fn push(&self, message: Message) -> String {
        let mut messages = self.messages.lock().unwrap();
        let id = message.meta.id.clone();
        messages.push(message);
        self.notify(&messages);
        id
    }

    pub fn get_all(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn get_message(&self, id: &str) -> Option<Message> {
        self.messages.lock().unwrap().iter().find(|m| m.meta.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset the log, keeping the system message if one is present
    /// (SPEC_FULL §3: `clear(keep_system=true)`).
    pub fn clear(&self) {
        let mut messages = self.messages.lock().unwrap();
        messages.retain(|m| m.is_system());
        self.notify(&messages);
    }

    /// Insert a new message directly after `after_id`. The new message's
    /// `created_at` is placed between its neighbors (or tied with `after_id`
    /// if there's no room), preserving the non-decreasing ordering invariant.
    pub fn insert_after(&self, after_id: &str, role: Role, content: impl Into<String>) -> Result<String> {
        let mut messages = self.messages.lock().unwrap();
        let pos = messages
            .iter()
            .position(|m| m.meta.id == after_id)
            .ok_or_else(|| Error::NotFound(format!("no message with id '{after_id}'")))?;

        let after_created_at = messages[pos].meta.created_at;
        let created_at = match messages.get(pos + 1) {
            Some(next) if next.meta.created_at > after_created_at + 1 => {
                after_created_at + (next.meta.created_at - after_created_at) / 2
            }
            _ => after_created_at,
        };

        let msg = Message {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            meta: MessageMeta {
                id: new_id(),
                created_at,
                parent_id: Some(after_id.to_string()),
                cycle: 0,
            },
        };
        let id = msg.meta.id.clone();
        messages.insert(pos + 1, msg);
        self.notify(&messages);
        Ok(id)
    }

    /// Replace a message's content in place, leaving its role, id, and
    /// position untouched (SPEC_FULL §4.1 `update_content`).
    pub fn update_content(&self, id: &str, content: impl Into<String>) -> Result<()> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.meta.id == id)
            .ok_or_else(|| Error::NotFound(format!("no message with id '{id}'")))?;
        message.content = Some(content.into());
        self.notify(&messages);
        Ok(())
    }

    /// Drop every message whose id is in `ids`. System messages are never
    /// removed by this operation, even if listed (SPEC_FULL §4.1 `delete`).
    pub fn delete(&self, ids: &[String]) -> usize {
        let mut messages = self.messages.lock().unwrap();
        let id_set: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = messages.len();
        messages.retain(|m| m.is_system() || !id_set.contains(m.meta.id.as_str()));
        let removed = before - messages.len();
        self.notify(&messages);
        removed
    }

    /// Drop the assistant message bearing `call_id` and every tool response
    /// paired with one of that assistant message's tool calls, so no
    /// dangling `tool_call_id` reference survives (SPEC_FULL §4.1
    /// `delete_tool`).
    pub fn delete_tool(&self, call_id: &str) -> Result<usize> {
        let mut messages = self.messages.lock().unwrap();
        let assistant_pos = messages
            .iter()
            .position(|m| m.tool_calls.as_ref().is_some_and(|calls| calls.iter().any(|c| c.id == call_id)))
            .ok_or_else(|| Error::NotFound(format!("no assistant tool call with id '{call_id}'")))?;

        let paired_ids: std::collections::HashSet<String> = messages[assistant_pos]
            .tool_calls
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.id.clone())
            .collect();

        let before = messages.len();
        let mut idx = 0usize;
        messages.retain(|m| {
            let drop = idx == assistant_pos
                || m.tool_call_id.as_deref().is_some_and(|tcid| paired_ids.contains(tcid));
            idx += 1;
            !drop
        });
        let removed = before - messages.len();
        self.notify(&messages);
        Ok(removed)
    }

    /// Drop every message strictly after `id`, protecting any system message
    /// (SPEC_FULL §4.1 `delete_after`). Returns whether anything was removed.
    pub fn delete_after(&self, id: &str) -> Result<bool> {
        let mut messages = self.messages.lock().unwrap();
        let pos = messages
            .iter()
            .position(|m| m.meta.id == id)
            .ok_or_else(|| Error::NotFound(format!("no message with id '{id}'")))?;

        let before = messages.len();
        let mut idx = 0usize;
        messages.retain(|m| {
            let keep = idx <= pos || m.is_system();
            idx += 1;
            keep
        });
        self.notify(&messages);
        Ok(messages.len() != before)
    }

    /// Append an assistant reply: either plain `content`, or one or more
    /// tool calls each paired with its result (stored as assistant message
    /// plus one `tool` message per call, each `parent_id`-linked to the
    /// assistant message). Exactly one of the two must be meaningful
    /// (SPEC_FULL §4.1, Testable Property #9); otherwise fails with
    /// `Error::EmptyReply` and leaves the log unchanged.
    pub fn add_assistant_reply(
        &self,
        content: Option<String>,
        tool_calls: Option<Vec<(ToolCall, String)>>,
    ) -> Result<String> {
        let has_content = content.as_ref().is_some_and(|c| !c.is_empty());
        let has_tool_calls = tool_calls.as_ref().is_some_and(|tc| !tc.is_empty());
        if has_content == has_tool_calls {
            return Err(Error::EmptyReply);
        }

        let mut messages = self.messages.lock().unwrap();
        let assistant_id = new_id();
        let created_at = self.next_created_at();
        let calls_only: Option<Vec<ToolCall>> = tool_calls
            .as_ref()
            .map(|pairs| pairs.iter().map(|(call, _)| call.clone()).collect());

        messages.push(Message {
            role: Role::Assistant,
            content: if has_content { content } else { None },
            tool_calls: calls_only,
            tool_call_id: None,
            meta: MessageMeta {
                id: assistant_id.clone(),
                created_at,
                parent_id: None,
                cycle: 0,
            },
        });

        if let Some(pairs) = tool_calls {
            for (call, result) in pairs {
                messages.push(Message {
                    role: Role::Tool,
                    content: Some(result),
                    tool_calls: None,
                    tool_call_id: Some(call.id.clone()),
                    meta: MessageMeta {
                        id: new_id(),
                        created_at: self.next_created_at(),
                        parent_id: Some(assistant_id.clone()),
                        cycle: 0,
                    },
                });
            }
        }

        self.notify(&messages);
        Ok(assistant_id)
    }

    /// Delete a user message and every message in its turn-group: the user
    /// message plus all following assistant/tool messages up to (excluding)
    /// the next user message (SPEC_FULL §3 cascading deletion).
    pub fn delete_turn_group(&self, user_message_id: &str) -> Result<usize> {
        let mut messages = self.messages.lock().unwrap();
        let start = messages
            .iter()
            .position(|m| m.meta.id == user_message_id && m.is_user())
            .ok_or_else(|| Error::NotFound(format!("no user message with id '{user_message_id}'")))?;

        let end = messages
            .iter()
            .skip(start + 1)
            .position(|m| m.is_user())
            .map(|offset| start + 1 + offset)
            .unwrap_or(messages.len());

        let removed = end - start;
        messages.drain(start..end);
        self.notify(&messages);
        Ok(removed)
    }

    /// Replace the entire log at once with the Refiner's output.
    ///
    /// Used to swap in a refined transcript for the model call without
    /// mutating the durable log observers see for history purposes; callers
    /// that want the refined view to become durable should call this on the
    /// store's own copy, not a separate one.
    pub fn assert_invariants(&self) -> Result<()> {
        let messages = self.messages.lock().unwrap();
        validate_invariants(&messages)
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

fn has_matching_tool_call(messages: &[Message], tool_call_id: &str) -> bool {
    messages.iter().any(|m| {
        m.tool_calls
            .as_ref()
            .is_some_and(|calls| calls.iter().any(|tc| tc.id == tool_call_id))
    })
}

/// Validate the SPEC_FULL §3 invariants against a full log: at most one
/// system message at position 0, tool_call_id references resolve, tool-call
/// ids are unique, `created_at` is non-decreasing.
pub fn validate_invariants(messages: &[Message]) -> Result<()> {
    let system_count = messages.iter().filter(|m| m.is_system()).count();
    if system_count > 1 {
        return Err(Error::Validation("more than one system message present".into()));
    }
    if system_count == 1 && !messages[0].is_system() {
        return Err(Error::Validation("system message is not at position 0".into()));
    }

    let mut seen_call_ids = std::collections::HashSet::new();
    for message in messages {
        if let Some(calls) = &message.tool_calls {
            for call in calls {
                if !seen_call_ids.insert(call.id.clone()) {
                    return Err(Error::Validation(format!("duplicate tool_call id '{}'", call.id)));
                }
            }
        }
    }

    for message in messages {
        if let Some(tool_call_id) = &message.tool_call_id {
            if !seen_call_ids.contains(tool_call_id) {
                return Err(Error::Validation(format!(
                    "tool message references unknown tool_call_id '{tool_call_id}'"
                )));
            }
        }
    }

    let mut last_created_at = i64::MIN;
    for message in messages {
        if message.meta.created_at < last_created_at {
            return Err(Error::Validation("messages are not ordered by created_at".into()));
        }
        last_created_at = message.meta.created_at;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_system_message_replaces_and_stays_first() {
        let store = MessageStore::new();
        store.add_user_message("hi");
        store.set_system_message("v1");
        store.set_system_message("v2");

        let all = store.get_all();
        assert_eq!(all.iter().filter(|m| m.is_system()).count(), 1);
        assert!(all[0].is_system());
        assert_eq!(all[0].content.as_deref(), Some("v2"));
    }

    #[test]
    fn add_tool_result_requires_matching_call_id() {
        let store = MessageStore::new();
        let err = store.add_tool_result("missing-id", "result").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn add_tool_result_succeeds_after_matching_call() {
        let store = MessageStore::new();
        store.add_assistant_tool_calls(vec![ToolCall::new("c1", "p__tool", "{}")]);
        let id = store.add_tool_result("c1", "ok").unwrap();
        assert!(!id.is_empty());
    }

    #[test]
    fn append_turn_rejects_mismatched_call_id() {
        let store = MessageStore::new();
        let result = store.append_turn(
            vec![ToolCall::new("c1", "p__tool", "{}")],
            vec![("c-other".into(), "ok".into())],
        );
        assert!(result.is_err());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn append_turn_appends_atomically() {
        let store = MessageStore::new();
        store
            .append_turn(
                vec![ToolCall::new("c1", "p__tool", "{}"), ToolCall::new("c2", "p__tool2", "{}")],
                vec![("c1".into(), "one".into()), ("c2".into(), "two".into())],
            )
            .unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn delete_turn_group_removes_through_next_user_message() {
        let store = MessageStore::new();
        store.set_system_message("sys");
        let u1 = store.add_user_message("first");
        store.add_assistant_message("reply one");
        store.add_user_message("second");
        store.add_assistant_message("reply two");

        let removed = store.delete_turn_group(&u1).unwrap();
        assert_eq!(removed, 2); // u1 + its assistant reply
        let all = store.get_all();
        assert_eq!(all.len(), 3); // system + second user + reply two
        assert_eq!(all[1].content.as_deref(), Some("second"));
    }

    #[test]
    fn validate_invariants_rejects_duplicate_call_ids() {
        let messages = vec![
            Message {
                role: Role::Assistant,
                content: None,
                tool_calls: Some(vec![ToolCall::new("dup", "p__a", "{}")]),
                tool_call_id: None,
                meta: MessageMeta { id: "m1".into(), created_at: 0, parent_id: None, cycle: 0 },
            },
            Message {
                role: Role::Assistant,
                content: None,
                tool_calls: Some(vec![ToolCall::new("dup", "p__b", "{}")]),
                tool_call_id: None,
                meta: MessageMeta { id: "m2".into(), created_at: 1, parent_id: None, cycle: 0 },
            },
        ];
        assert!(validate_invariants(&messages).is_err());
    }

    #[test]
    fn subscribers_receive_a_snapshot_per_mutation() {
        let store = MessageStore::new();
        let mut rx = store.subscribe();
        store.add_user_message("hello");
        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.messages.len(), 1);
    }

    #[test]
    fn clear_keeps_the_system_message() {
        let store = MessageStore::new();
        store.set_system_message("sys");
        store.add_user_message("hi");
        store.add_assistant_message("hello");

        store.clear();

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_system());
        assert_eq!(all[0].content.as_deref(), Some("sys"));
    }

    #[test]
    fn clear_leaves_an_empty_log_when_no_system_message_present() {
        let store = MessageStore::new();
        store.add_user_message("hi");
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn insert_after_places_message_directly_following_its_anchor() {
        let store = MessageStore::new();
        let u1 = store.add_user_message("first");
        store.add_user_message("third");

        let inserted = store.insert_after(&u1, Role::User, "second").unwrap();

        let all = store.get_all();
        assert_eq!(all[1].meta.id, inserted);
        assert_eq!(all[1].content.as_deref(), Some("second"));
        validate_invariants(&all).unwrap();
    }

    #[test]
    fn insert_after_rejects_unknown_anchor() {
        let store = MessageStore::new();
        let err = store.insert_after("missing", Role::User, "x").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn update_content_replaces_text_in_place() {
        let store = MessageStore::new();
        let id = store.add_user_message("wrong");
        store.update_content(&id, "right").unwrap();
        assert_eq!(store.get_message(&id).unwrap().content.as_deref(), Some("right"));
    }

    #[test]
    fn update_content_rejects_unknown_id() {
        let store = MessageStore::new();
        let err = store.update_content("missing", "x").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn delete_drops_listed_messages_but_protects_system() {
        let store = MessageStore::new();
        store.set_system_message("sys");
        let u1 = store.add_user_message("one");
        let u2 = store.add_user_message("two");

        let system_id = store.get_all()[0].meta.id.clone();
        let removed = store.delete(&[system_id, u1]);

        assert_eq!(removed, 1);
        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert!(all[0].is_system());
        assert_eq!(all[1].meta.id, u2);
    }

    #[test]
    fn delete_tool_drops_the_assistant_message_and_its_paired_result() {
        let store = MessageStore::new();
        store
            .append_turn(
                vec![ToolCall::new("c1", "p__tool", "{}")],
                vec![("c1".into(), "ok".into())],
            )
            .unwrap();
        assert_eq!(store.len(), 2);

        let removed = store.delete_tool("c1").unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn delete_tool_rejects_unknown_call_id() {
        let store = MessageStore::new();
        let err = store.delete_tool("missing").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn delete_after_drops_everything_past_the_anchor_but_keeps_system() {
        let store = MessageStore::new();
        store.set_system_message("sys");
        let u1 = store.add_user_message("first");
        store.add_assistant_message("reply");
        store.add_user_message("second");

        let removed = store.delete_after(&u1).unwrap();
        assert!(removed);

        let all = store.get_all();
        assert_eq!(all.len(), 2); // system + first user message
        assert!(all[0].is_system());
        assert_eq!(all[1].meta.id, u1);
    }

    #[test]
    fn add_assistant_reply_with_content_only_appends_one_message() {
        let store = MessageStore::new();
        let id = store.add_assistant_reply(Some("hello".into()), None).unwrap();
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].meta.id, id);
        assert_eq!(all[0].content.as_deref(), Some("hello"));
    }

    #[test]
    fn add_assistant_reply_with_tool_calls_links_tool_messages_to_the_assistant() {
        let store = MessageStore::new();
        let assistant_id = store
            .add_assistant_reply(
                None,
                Some(vec![(ToolCall::new("c1", "p__tool", "{}"), "result".to_string())]),
            )
            .unwrap();

        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert!(all[0].has_tool_calls());
        assert_eq!(all[0].meta.id, assistant_id);
        assert!(all[1].is_tool());
        assert_eq!(all[1].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(all[1].meta.parent_id.as_deref(), Some(assistant_id.as_str()));
    }

    #[test]
    fn add_assistant_reply_with_neither_content_nor_tool_calls_fails_empty_reply() {
        let store = MessageStore::new();
        let err = store.add_assistant_reply(None, None).unwrap_err();
        assert!(matches!(err, Error::EmptyReply));
        assert!(store.is_empty());
    }

    #[test]
    fn add_assistant_reply_with_both_content_and_tool_calls_fails_empty_reply() {
        let store = MessageStore::new();
        let err = store
            .add_assistant_reply(
                Some("hi".into()),
                Some(vec![(ToolCall::new("c1", "p__tool", "{}"), "result".to_string())]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::EmptyReply));
        assert!(store.is_empty());
    }
}
