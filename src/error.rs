use thiserror::Error;

use crate::compose::ComposeError;
use crate::encoder::EncodeError;

/// Failures inside a responder cycle. Each is logged where it happens and
/// skips only the affected message or cycle step.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("failed to look up the mailbox address")]
    Profile(#[source] anyhow::Error),

    #[error("failed to list candidate messages")]
    List(#[source] anyhow::Error),

    #[error("failed to fetch headers of message {id}")]
    Fetch {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot build reply to message {id}")]
    HeaderExtraction {
        id: String,
        #[source]
        source: ComposeError,
    },

    #[error("cannot encode reply to message {id}")]
    Encode {
        id: String,
        #[source]
        source: EncodeError,
    },

    #[error("failed to send reply to message {id}")]
    Send {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to resolve label {name:?}")]
    Label {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to tag and archive message {id}")]
    Tag {
        id: String,
        #[source]
        source: anyhow::Error,
    },
}
