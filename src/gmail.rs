use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::ModifyMessageRequest;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use tracing::debug;
use yup_oauth2::ApplicationSecret;

use crate::auth::{AuthError, Authenticator, MailboxConnector};
use crate::models::{self, LabelSpec, MessageHeader, is_user_label_id};
use crate::transport::MailTransport;

const USER_ID: &str = "me";

#[derive(Clone)]
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
}

impl GmailClient {
    pub fn new(hub: Gmail<HttpsConnector<HttpConnector>>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl MailTransport for GmailClient {
    async fn account_address(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile(USER_ID)
            .doit()
            .await
            .context("Failed to get mailbox profile")?;

        profile
            .email_address
            .context("Mailbox profile has no email address")
    }

    async fn list_candidate_messages(&self, query: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.hub.users().messages_list(USER_ID).q(query);
            if let Some(token) = &page_token {
                req = req.page_token(token);
            }

            let (_, message_list) = req.doit().await.context("Failed to list messages")?;

            ids.extend(
                message_list
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            match message_list.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} messages for {:?}", ids.len(), query);
        Ok(ids)
    }

    async fn get_message_headers(&self, id: &str, header_names: &[&str]) -> Result<models::Message> {
        let mut req = self.hub.users().messages_get(USER_ID, id).format("metadata");
        for name in header_names {
            req = req.add_metadata_headers(name);
        }

        let (_, msg) = req
            .doit()
            .await
            .with_context(|| format!("Failed to get message {}", id))?;

        let headers = msg
            .payload
            .and_then(|p| p.headers)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|h| Some(MessageHeader::new(h.name?, h.value.unwrap_or_default())))
            .collect();

        Ok(models::Message {
            id: msg.id.unwrap_or_else(|| id.to_string()),
            headers,
            has_user_label: msg
                .label_ids
                .unwrap_or_default()
                .iter()
                .any(|l| is_user_label_id(l)),
        })
    }

    async fn send_message(&self, raw: Vec<u8>) -> Result<()> {
        debug!("Sending message of {} bytes", raw.len());
        let mime = "message/rfc822"
            .parse()
            .context("Invalid upload mime type")?;

        self.hub
            .users()
            .messages_send(google_gmail1::api::Message::default(), USER_ID)
            .upload(Cursor::new(raw), mime)
            .await
            .context("Failed to send message")?;

        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<models::Label>> {
        let (_, label_list) = self
            .hub
            .users()
            .labels_list(USER_ID)
            .doit()
            .await
            .context("Failed to list labels")?;

        let labels = label_list
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(to_label)
            .collect();

        Ok(labels)
    }

    async fn create_label(&self, spec: &LabelSpec) -> Result<models::Label> {
        let req = google_gmail1::api::Label {
            name: Some(spec.name.clone()),
            label_list_visibility: Some(spec.label_list_visibility.clone()),
            message_list_visibility: Some(spec.message_list_visibility.clone()),
            ..Default::default()
        };

        let (_, label) = self
            .hub
            .users()
            .labels_create(req, USER_ID)
            .doit()
            .await
            .with_context(|| format!("Failed to create label {:?}", spec.name))?;

        Ok(to_label(label))
    }

    async fn modify_message_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<()> {
        let req = ModifyMessageRequest {
            add_label_ids: Some(add.to_vec()),
            remove_label_ids: Some(remove.to_vec()),
        };
        self.hub
            .users()
            .messages_modify(req, USER_ID, id)
            .doit()
            .await
            .with_context(|| format!("Failed to modify labels of message {}", id))?;
        Ok(())
    }
}

fn to_label(l: google_gmail1::api::Label) -> models::Label {
    models::Label {
        id: l.id.unwrap_or_default(),
        name: l.name.unwrap_or_default(),
        label_list_visibility: l.label_list_visibility,
        message_list_visibility: l.message_list_visibility,
    }
}

/// Authenticates against Gmail with a client secret loaded at startup.
pub struct GmailConnector {
    secret: ApplicationSecret,
}

impl GmailConnector {
    pub fn new(secret: ApplicationSecret) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl MailboxConnector for GmailConnector {
    async fn connect(&self) -> Result<Arc<dyn MailTransport>, AuthError> {
        let auth = Authenticator::authenticate(self.secret.clone()).await?;

        let hub = Gmail::new(
            hyper::Client::builder().build(
                hyper_rustls::HttpsConnectorBuilder::new()
                    .with_native_roots()
                    .map_err(AuthError::Tls)?
                    .https_only()
                    .enable_http1()
                    .build(),
            ),
            auth,
        );

        Ok(Arc::new(GmailClient::new(hub)))
    }
}
