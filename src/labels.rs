use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::models::{INBOX_LABEL_ID, LabelSpec};
use crate::transport::MailTransport;

pub struct LabelManager {
    transport: Arc<dyn MailTransport>,
}

impl LabelManager {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    /// Id of the label named exactly `name`, creating it if none exists.
    ///
    /// Not safe against another process creating the same label concurrently.
    pub async fn ensure_label(&self, name: &str) -> Result<String> {
        let labels = self
            .transport
            .list_labels()
            .await
            .context("Failed to list labels")?;

        if let Some(label) = labels.into_iter().find(|l| l.name == name) {
            debug!(label_id = %label.id, "Found existing label {:?}", name);
            if !label.is_visible() {
                warn!(label_id = %label.id, "Label {:?} is hidden in Gmail", name);
            }
            return Ok(label.id);
        }

        let created = self
            .transport
            .create_label(&LabelSpec::visible(name))
            .await
            .with_context(|| format!("Failed to create label {:?}", name))?;
        info!(label_id = %created.id, "Created label {:?}", name);
        Ok(created.id)
    }

    /// Adds `label_id` and removes INBOX in a single mutation.
    pub async fn tag_and_archive(&self, message_id: &str, label_id: &str) -> Result<()> {
        self.transport
            .modify_message_labels(
                message_id,
                &[label_id.to_string()],
                &[INBOX_LABEL_ID.to_string()],
            )
            .await
            .with_context(|| format!("Failed to tag message {}", message_id))
    }
}
