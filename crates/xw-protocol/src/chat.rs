use serde::{Deserialize, Serialize};

/// Role of a message sent to the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One call to the completion service.
///
/// The model identifier is owned by the client configuration, so a request
/// only carries what varies per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Ordered role-tagged messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature (0 = deterministic).
    pub temperature: f32,
    /// Maximum output tokens.
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.0,
            max_tokens: 256,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Content of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), r#""assistant""#);
    }

    #[test]
    fn last_user_message_skips_other_roles() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("你是命令解析器"),
            ChatMessage::user("第一句"),
            ChatMessage::assistant("好的"),
            ChatMessage::user("修炼"),
        ]);
        assert_eq!(req.last_user_message(), Some("修炼"));
    }

    #[test]
    fn last_user_message_none_without_user() {
        let req = CompletionRequest::new(vec![ChatMessage::system("only system")]);
        assert!(req.last_user_message().is_none());
    }

    #[test]
    fn builder_defaults() {
        let req = CompletionRequest::new(vec![]).with_max_tokens(150).with_temperature(0.3);
        assert_eq!(req.max_tokens, 150);
        assert!((req.temperature - 0.3).abs() < f32::EPSILON);
    }
}
