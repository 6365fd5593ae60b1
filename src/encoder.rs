//! RFC 5322 encoding of outgoing plain-text mail.

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::{Address, Message};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid {field} address {address:?}")]
    InvalidAddress {
        field: &'static str,
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("failed to build message")]
    Build(#[source] lettre::error::Error),
}

/// Headers of an outgoing message. Addresses are bare, without display names.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingHeaders<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    /// Written to both `In-Reply-To` and `References`.
    pub in_reply_to: Option<&'a str>,
}

pub fn encode(headers: &OutgoingHeaders<'_>, body: &str) -> Result<Vec<u8>, EncodeError> {
    let mut builder = Message::builder()
        .from(mailbox("From", headers.from)?)
        .to(mailbox("To", headers.to)?)
        .subject(headers.subject)
        .header(ContentType::TEXT_PLAIN);

    if let Some(id) = headers.in_reply_to {
        builder = builder.in_reply_to(id.to_string());
        builder = builder.references(id.to_string());
    }

    let message = builder.body(body.to_string()).map_err(EncodeError::Build)?;
    Ok(message.formatted())
}

fn mailbox(field: &'static str, address: &str) -> Result<Mailbox, EncodeError> {
    let parsed: Address = address
        .parse()
        .map_err(|source| EncodeError::InvalidAddress {
            field,
            address: address.to_string(),
            source,
        })?;
    Ok(Mailbox::new(None, parsed))
}
