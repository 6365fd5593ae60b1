use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Label, LabelSpec, Message};

/// Remote mailbox operations the responder depends on.
///
/// Implemented by [`crate::gmail::GmailClient`] over an authorized session.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Address of the authorized mailbox, used as the reply sender.
    async fn account_address(&self) -> Result<String>;

    /// Ids of every message matching `query`, in the order the server lists them.
    async fn list_candidate_messages(&self, query: &str) -> Result<Vec<String>>;

    async fn get_message_headers(&self, id: &str, header_names: &[&str]) -> Result<Message>;

    /// Sends an RFC 5322 message.
    async fn send_message(&self, raw: Vec<u8>) -> Result<()>;

    async fn list_labels(&self) -> Result<Vec<Label>>;

    async fn create_label(&self, spec: &LabelSpec) -> Result<Label>;

    async fn modify_message_labels(&self, id: &str, add: &[String], remove: &[String])
    -> Result<()>;
}
