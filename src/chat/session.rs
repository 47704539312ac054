//! Conversation state: an explicit ordered list of turns owned by the chat
//! command and handed to the model loop each query.

use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    /// Either a plain string or an array of content blocks.
    pub content: Value,
}

#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user_text(&mut self, text: &str) {
        self.turns.push(Turn {
            role: Role::User,
            content: json!(text),
        });
    }

    /// Append the assistant's content blocks verbatim so tool_use blocks stay
    /// paired with the tool_result turns that follow.
    pub fn push_assistant(&mut self, content: Value) {
        self.turns.push(Turn {
            role: Role::Assistant,
            content,
        });
    }

    /// Tool results ride on a user turn per the messages wire format.
    pub fn push_tool_results(&mut self, blocks: Vec<Value>) {
        self.turns.push(Turn {
            role: Role::User,
            content: Value::Array(blocks),
        });
    }

    /// Wire-format messages array.
    pub fn messages(&self) -> Value {
        Value::Array(
            self.turns
                .iter()
                .map(|turn| json!({ "role": turn.role.as_str(), "content": turn.content }))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }
}
