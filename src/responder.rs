//! The polling loop: list candidates, reply to each, tag and archive it.
//!
//! A [`Responder`] owns the cached marker label id and sender address. [`Responder::start`] moves
//! it into a single background task that sleeps a random delay, runs one full
//! cycle, and only then draws the next delay, so cycles never overlap.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::compose::{self, FROM_HEADER, SUBJECT_HEADER};
use crate::config::ResponderConfig;
use crate::error::ResponderError;
use crate::labels::LabelManager;
use crate::transport::MailTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Idle,
    Listing,
    Replying,
    Tagging,
    Stopped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub listed: usize,
    pub replied: usize,
    pub tagged: usize,
    pub failed: usize,
    /// Candidates that already carried a user label.
    pub skipped: usize,
}

/// Per-mailbox values resolved once and reused by every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub label_id: String,
    pub sender: String,
}

enum Outcome {
    Sent,
    AlreadyLabeled,
}

pub struct Responder {
    transport: Arc<dyn MailTransport>,
    labels: LabelManager,
    config: ResponderConfig,
    session: Option<Session>,
    state: Arc<Mutex<ResponderState>>,
}

impl Responder {
    pub fn new(transport: Arc<dyn MailTransport>, config: ResponderConfig) -> Self {
        Self {
            labels: LabelManager::new(transport.clone()),
            transport,
            config,
            session: None,
            state: Arc::new(Mutex::new(ResponderState::Idle)),
        }
    }

    /// Resolves the sender address and marker label, caching both for later cycles.
    pub async fn prepare(&mut self) -> Result<Session, ResponderError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        let sender = self
            .transport
            .account_address()
            .await
            .map_err(ResponderError::Profile)?;

        let name = &self.config.label_name;
        let label_id = self
            .labels
            .ensure_label(name)
            .await
            .map_err(|source| ResponderError::Label {
                name: name.clone(),
                source,
            })?;
        info!(label_id = %label_id, sender = %sender, "Using label {:?}", name);

        let session = Session { label_id, sender };
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Delay before the next cycle, uniform over whole seconds in the configured bounds.
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_secs(rng.gen_range(self.config.min_delay_secs..=self.config.max_delay_secs))
    }

    /// One pass over every current candidate.
    ///
    /// Only an unresolved session or a failed listing abort the cycle. Per-message
    /// failures are logged and counted.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, ResponderError> {
        let Session { label_id, sender } = self.prepare().await?;

        self.set_state(ResponderState::Listing);
        let ids = self
            .transport
            .list_candidate_messages(&self.config.query)
            .await
            .map_err(ResponderError::List);
        let ids = match ids {
            Ok(ids) => ids,
            Err(e) => {
                self.set_state(ResponderState::Idle);
                return Err(e);
            }
        };
        info!("{} unreplied messages found", ids.len());

        let mut report = CycleReport {
            listed: ids.len(),
            ..Default::default()
        };

        for id in &ids {
            self.set_state(ResponderState::Replying);
            let replied = match self.reply(id, &sender).await {
                Ok(Outcome::Sent) => {
                    info!(message_id = %id, "Reply sent");
                    report.replied += 1;
                    true
                }
                Ok(Outcome::AlreadyLabeled) => {
                    warn!(message_id = %id, "Skipping candidate that already carries a user label");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(message_id = %id, "{:#}", anyhow::Error::from(e));
                    report.failed += 1;
                    false
                }
            };

            if !replied {
                if !self.config.tag_on_send_failure {
                    debug!(message_id = %id, "Leaving message untagged for the next cycle");
                    continue;
                }
                warn!(message_id = %id, "Tagging message although its reply was not sent");
            }

            self.set_state(ResponderState::Tagging);
            match self.tag(id, &label_id).await {
                Ok(()) => {
                    info!(message_id = %id, label_id = %label_id, "Label added");
                    report.tagged += 1;
                }
                Err(e) => {
                    error!(message_id = %id, "{:#}", anyhow::Error::from(e));
                    if replied {
                        report.failed += 1;
                    }
                }
            }
        }

        self.set_state(ResponderState::Idle);
        Ok(report)
    }

    async fn reply(&self, id: &str, sender: &str) -> Result<Outcome, ResponderError> {
        let message = self
            .transport
            .get_message_headers(id, &[SUBJECT_HEADER, FROM_HEADER])
            .await
            .map_err(|source| ResponderError::Fetch {
                id: id.to_string(),
                source,
            })?;
        if message.has_user_label {
            return Ok(Outcome::AlreadyLabeled);
        }

        let draft = compose::compose_reply(&message, &self.config.reply_body).map_err(|source| {
            ResponderError::HeaderExtraction {
                id: id.to_string(),
                source,
            }
        })?;

        let raw = draft.to_rfc822(sender).map_err(|source| ResponderError::Encode {
            id: id.to_string(),
            source,
        })?;

        self.transport
            .send_message(raw)
            .await
            .map_err(|source| ResponderError::Send {
                id: id.to_string(),
                source,
            })?;
        Ok(Outcome::Sent)
    }

    async fn tag(&self, id: &str, label_id: &str) -> Result<(), ResponderError> {
        self.labels
            .tag_and_archive(id, label_id)
            .await
            .map_err(|source| ResponderError::Tag {
                id: id.to_string(),
                source,
            })
    }

    fn set_state(&self, state: ResponderState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Spawns the timer task. The responder lives inside it until stopped.
    pub fn start(self) -> ResponderHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let state = self.state.clone();
        let mut responder = self;

        let task = tokio::spawn(async move {
            info!("Responder started");
            loop {
                let delay = responder.next_delay(&mut rand::thread_rng());
                info!(delay_secs = delay.as_secs(), "Next check scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => break,
                }

                match responder.run_cycle().await {
                    Ok(report) => info!(
                        listed = report.listed,
                        replied = report.replied,
                        tagged = report.tagged,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Cycle finished"
                    ),
                    Err(e) => error!("Cycle skipped: {:#}", anyhow::Error::from(e)),
                }

                if *shutdown_rx.borrow() {
                    break;
                }
            }
            responder.set_state(ResponderState::Stopped);
            info!("Responder stopped");
        });

        ResponderHandle {
            shutdown: shutdown_tx,
            task,
            state,
        }
    }
}

/// Owns the running timer task.
pub struct ResponderHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    state: Arc<Mutex<ResponderState>>,
}

impl ResponderHandle {
    pub fn state(&self) -> ResponderState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ResponderState::Stopped)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the loop. An in-flight cycle is allowed to finish first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Responder task failed: {}", e);
        }
    }
}
