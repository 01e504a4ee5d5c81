use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single chat turn sent to or received from a model provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user() -> Self {
        Self {
            role: Role::User,
            content: String::new(),
        }
    }

    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
        }
    }

    /// Append text to the message body
    pub fn with_text<S: AsRef<str>>(mut self, text: S) -> Self {
        self.content.push_str(text.as_ref());
        self
    }

    pub fn as_text(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builders() {
        let message = Message::user().with_text("hello ").with_text("there");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.as_text(), "hello there");

        let reply = Message::assistant().with_text("hi");
        assert_eq!(reply.role, Role::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let message = Message::assistant().with_text("ok");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "ok");
    }
}
