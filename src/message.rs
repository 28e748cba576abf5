use chrono::{DateTime, Utc};

pub const MAX_DISPLAY_NAME_CHARS: usize = 50;
pub const MAX_BODY_CHARS: usize = 500;

/// A text message as handed over by the platform. Consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: Option<String>,
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(sender: Option<String>, body: Option<String>) -> Self {
        Self {
            sender,
            body,
            received_at: Utc::now(),
        }
    }

    /// Parse a `sender<TAB>body` line. A line without a tab has no body.
    pub fn from_line(line: &str) -> Self {
        match line.split_once('\t') {
            Some((sender, body)) => Self::new(Some(sender.trim().to_string()), Some(body.to_string())),
            None => Self::new(Some(line.trim().to_string()), None),
        }
    }
}

/// Plaintext fields that get encrypted and relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPayload {
    pub display_name: String,
    pub message_body: String,
    pub device_label: String,
}

impl DeliveryPayload {
    pub fn new(display_name: &str, body: Option<&str>, device_label: String) -> Self {
        let display_name: String = display_name.chars().take(MAX_DISPLAY_NAME_CHARS).collect();
        let message_body: String = body
            .unwrap_or_default()
            .chars()
            .take(MAX_BODY_CHARS)
            .collect::<String>()
            .trim()
            .to_string();
        Self {
            display_name,
            message_body,
            device_label,
        }
    }

    /// `display_name|message_body|device_label`
    pub fn to_plaintext(&self) -> String {
        format!(
            "{}|{}|{}",
            self.display_name, self.message_body, self.device_label
        )
    }

    /// `Title` header value. Control characters would make the header
    /// invalid, so they are replaced with spaces.
    pub fn title(&self) -> String {
        let name: String = self
            .display_name
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        format!("SMS from {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_truncates_by_chars() {
        let name = "é".repeat(60);
        let body = format!("   {}", "x".repeat(600));
        let payload = DeliveryPayload::new(&name, Some(&body), "Pixel 8".to_string());

        assert_eq!(payload.display_name.chars().count(), 50);
        // 3 spaces + 497 x's survive the cut, then the spaces are trimmed
        assert_eq!(payload.message_body, "x".repeat(497));
        assert_eq!(payload.device_label, "Pixel 8");
    }

    #[test]
    fn test_plaintext_is_pipe_joined() {
        let payload = DeliveryPayload::new(
            "Alice",
            Some("  Your OTP is 4821\n"),
            "Pixel 8".to_string(),
        );
        assert_eq!(payload.to_plaintext(), "Alice|Your OTP is 4821|Pixel 8");
        assert_eq!(payload.title(), "SMS from Alice");
    }

    #[test]
    fn test_missing_body_is_empty() {
        let payload = DeliveryPayload::new("Alice", None, "Unknown Device".to_string());
        assert_eq!(payload.to_plaintext(), "Alice||Unknown Device");
    }

    #[test]
    fn test_title_strips_control_characters() {
        let payload = DeliveryPayload::new("Bob\r\nX-Injected: 1", Some("hi"), "d".to_string());
        assert_eq!(payload.title(), "SMS from Bob  X-Injected: 1");
    }

    #[test]
    fn test_from_line() {
        let message = InboundMessage::from_line("HDFC-Bank\tYour OTP is 4821");
        assert_eq!(message.sender.as_deref(), Some("HDFC-Bank"));
        assert_eq!(message.body.as_deref(), Some("Your OTP is 4821"));

        let no_body = InboundMessage::from_line("+15551234567");
        assert_eq!(no_body.body, None);
    }
}
