use crate::types::{ChatMessage, Role};

/// Conversation sent with every request.
///
/// The system prompt always sits at index 0 and is never evicted. At most
/// `max_turns` further messages are kept, oldest dropped first.
#[derive(Clone, Debug)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
            max_turns,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::assistant(content));
    }

    /// Drops everything except the system prompt.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }

    fn push(&mut self, message: ChatMessage) {
        debug_assert_ne!(message.role, Role::System);
        self.messages.push(message);
        let excess = (self.messages.len() - 1).saturating_sub(self.max_turns);
        if excess > 0 {
            self.messages.drain(1..=excess);
        }
    }
}
