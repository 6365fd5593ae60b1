//! Builds the automatic reply for a candidate message.

use thiserror::Error;

use crate::encoder::{self, EncodeError, OutgoingHeaders};
use crate::models::{Message, ReplyDraft};

pub const SUBJECT_HEADER: &str = "Subject";
pub const FROM_HEADER: &str = "From";
pub const REPLY_PREFIX: &str = "Reply:";

pub const DEFAULT_REPLY_BODY: &str = "Hi,\n\nThanks for reaching out.\n\nCurrently I'm on vacation and will reply to you the day after tomorrow.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("message has no {0} header")]
    MissingHeader(&'static str),
    #[error("no <address> found in sender {0:?}")]
    MalformedSender(String),
}

pub fn compose_reply(message: &Message, body: &str) -> Result<ReplyDraft, ComposeError> {
    let subject = message
        .header(SUBJECT_HEADER)
        .ok_or(ComposeError::MissingHeader(SUBJECT_HEADER))?;
    let from = message
        .header(FROM_HEADER)
        .ok_or(ComposeError::MissingHeader(FROM_HEADER))?;

    Ok(ReplyDraft {
        to: sender_address(from)?.to_string(),
        subject: reply_subject(subject),
        in_reply_to: message.id.clone(),
        body: body.to_string(),
    })
}

/// The trimmed text between the first `<` and the last `>` after it.
pub fn sender_address(from: &str) -> Result<&str, ComposeError> {
    let malformed = || ComposeError::MalformedSender(from.to_string());

    let start = from.find('<').ok_or_else(malformed)? + 1;
    let end = from[start..].rfind('>').ok_or_else(malformed)? + start;
    let address = from[start..end].trim();

    if address.is_empty() {
        return Err(malformed());
    }
    Ok(address)
}

/// Exact, case-sensitive prefix check: "RE:" or "reply:" still get prefixed.
pub fn reply_subject(subject: &str) -> String {
    if subject.starts_with(REPLY_PREFIX) {
        subject.to_string()
    } else {
        format!("{REPLY_PREFIX} {subject}")
    }
}

impl ReplyDraft {
    /// Wire form of the reply sent from `from`. Threading headers carry the
    /// Gmail message id.
    pub fn to_rfc822(&self, from: &str) -> Result<Vec<u8>, EncodeError> {
        encoder::encode(
            &OutgoingHeaders {
                from,
                to: &self.to,
                subject: &self.subject,
                in_reply_to: Some(self.in_reply_to.as_str()),
            },
            &self.body,
        )
    }
}
