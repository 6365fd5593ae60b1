/// Gmail prefixes the ids of user-created labels with this.
pub const USER_LABEL_PREFIX: &str = "Label_";
pub const INBOX_LABEL_ID: &str = "INBOX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl MessageHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A per-cycle snapshot of a candidate message. Never cached across cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub headers: Vec<MessageHeader>,
    pub has_user_label: bool,
}

impl Message {
    /// First header matching `name`, compared ASCII case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

pub fn is_user_label_id(label_id: &str) -> bool {
    label_id.starts_with(USER_LABEL_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub label_list_visibility: Option<String>,
    pub message_list_visibility: Option<String>,
}

impl Label {
    /// False when Gmail hides the label from the label list or from messages.
    /// Unset visibilities default to shown.
    pub fn is_visible(&self) -> bool {
        self.label_list_visibility.as_deref() != Some("labelHide")
            && self.message_list_visibility.as_deref() != Some("hide")
    }
}

/// Request body for creating a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    pub label_list_visibility: String,
    pub message_list_visibility: String,
}

impl LabelSpec {
    /// A label shown both in the label list and on messages.
    pub fn visible(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label_list_visibility: "labelShow".to_string(),
            message_list_visibility: "show".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDraft {
    pub to: String,
    pub subject: String,
    pub in_reply_to: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case_and_takes_first() {
        let msg = Message {
            id: "m1".into(),
            headers: vec![
                MessageHeader::new("subject", "first"),
                MessageHeader::new("Subject", "second"),
            ],
            has_user_label: false,
        };
        assert_eq!(msg.header("SUBJECT"), Some("first"));
        assert_eq!(msg.header("From"), None);
    }

    #[test]
    fn label_visibility() {
        let mut label = Label {
            id: "Label_1".into(),
            name: "During Vacation".into(),
            label_list_visibility: None,
            message_list_visibility: None,
        };
        assert!(label.is_visible());

        label.message_list_visibility = Some("hide".into());
        assert!(!label.is_visible());

        label.message_list_visibility = Some("show".into());
        label.label_list_visibility = Some("labelHide".into());
        assert!(!label.is_visible());
    }

    #[test]
    fn user_label_ids_are_recognized() {
        assert!(is_user_label_id("Label_12"));
        assert!(!is_user_label_id("INBOX"));
        assert!(!is_user_label_id("CATEGORY_PERSONAL"));
    }
}
