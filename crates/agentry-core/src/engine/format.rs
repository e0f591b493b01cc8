//! Prompt assembly for the LLM node.
//!
//! Internal messages are mapped onto the external chat schema, which only
//! knows `system`, `user` and `assistant`. Tool results travel as user
//! messages.

use agentry_types::llm::{ChatMessage, ChatRole};
use agentry_types::memory::MemoryContext;
use agentry_types::message::{AgentMessage, MessageRole};

use crate::memory::estimate_tokens;

pub fn chat_role(role: MessageRole) -> ChatRole {
    match role {
        MessageRole::System => ChatRole::System,
        MessageRole::User | MessageRole::Tool => ChatRole::User,
        MessageRole::Assistant => ChatRole::Assistant,
    }
}

fn to_chat(message: &AgentMessage) -> ChatMessage {
    // A pure tool request has no text; keep a trace so the model sees its own turn.
    let content = if message.content.is_empty() && message.requests_tools() {
        let names: Vec<&str> = message
            .tool_calls
            .iter()
            .map(|c| c.tool_name.as_str())
            .collect();
        format!("Requested tools: {}", names.join(", "))
    } else {
        message.content.clone()
    };
    ChatMessage::new(chat_role(message.role), content)
}

/// System prompt, compressed summary and history, oldest first.
pub fn build_prompt(system_prompt: &str, memory: &MemoryContext) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(memory.history.len() + 2);
    messages.push(ChatMessage::new(ChatRole::System, system_prompt));
    if let Some(summary) = &memory.compressed_history {
        messages.push(ChatMessage::new(
            ChatRole::System,
            format!("Summary of the earlier conversation:\n{summary}"),
        ));
    }
    messages.extend(memory.history.iter().map(to_chat));
    messages
}

fn prompt_tokens(messages: &[ChatMessage]) -> u32 {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

/// Trim `messages` until the estimate fits `max_tokens`.
///
/// The oldest non-system messages go first. The leading system message and
/// the newest message are never dropped; if those two alone are over budget
/// their text is cut instead.
pub fn fit_to_budget(mut messages: Vec<ChatMessage>, max_tokens: u32) -> Vec<ChatMessage> {
    let mut total = prompt_tokens(&messages);
    if total <= max_tokens {
        return messages;
    }

    while total > max_tokens && messages.len() > 2 {
        let last = messages.len() - 1;
        let idx = (1..last)
            .find(|&i| messages[i].role != ChatRole::System)
            .unwrap_or(1);
        let removed = messages.remove(idx);
        total -= estimate_tokens(&removed.content);
    }

    if total > max_tokens {
        let system_tokens = messages.first().map(|m| estimate_tokens(&m.content)).unwrap_or(0);
        if messages.len() > 1 {
            let budget = max_tokens.saturating_sub(system_tokens.min(max_tokens / 2));
            if let Some(newest) = messages.last_mut() {
                truncate_to_tokens(&mut newest.content, budget);
            }
        }
        let rest: u32 = messages.iter().skip(1).map(|m| estimate_tokens(&m.content)).sum();
        if let Some(system) = messages.first_mut() {
            truncate_to_tokens(&mut system.content, max_tokens.saturating_sub(rest));
        }
    }

    messages
}

fn truncate_to_tokens(text: &mut String, tokens: u32) {
    let max_chars = tokens as usize * 4;
    if let Some((byte_idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_idx);
    }
}
