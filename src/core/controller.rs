//! Conversation orchestration: user input in, exchanges out, transcript and
//! session store kept in step.
//!
//! The controller owns the in-memory transcript of the current session. It
//! writes the transcript back to the [`SessionStore`] whenever it changes at
//! rest: on submit, on a finished exchange, and on a failed one. A stopped
//! exchange writes nothing, so after every operation the shown, sent and
//! persisted turns agree.

use std::error::Error as StdError;
use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::chat_stream::StreamMessage;
use crate::core::delivery::{ExchangeRequest, ExchangeRunner, MessageDeliveryService};
use crate::core::error::DeliveryError;
use crate::core::message::Turn;
use crate::core::session_store::{Session, SessionStore, SessionUpdate};
use crate::core::snapshots::ChatSnapshots;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    /// An exchange is in flight; only events tagged with `exchange_id` apply.
    Awaiting { exchange_id: u64 },
    /// A user turn is being revised.
    Editing { index: usize, draft: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// An exchange is already in flight.
    Busy,
    /// An edit is open; save or cancel it first.
    EditInProgress,
    EmptyInput,
    NotAwaiting,
    NotEditing,
    /// Only user turns can be edited.
    NotEditable,
    IndexOutOfRange,
    MissingCredential,
    UnknownSession(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::Busy => write!(f, "A response is still being generated"),
            ControllerError::EditInProgress => write!(f, "Finish or cancel the current edit first"),
            ControllerError::EmptyInput => write!(f, "Message is empty"),
            ControllerError::NotAwaiting => write!(f, "Nothing is being generated"),
            ControllerError::NotEditing => write!(f, "No edit in progress"),
            ControllerError::NotEditable => write!(f, "Only your own messages can be edited"),
            ControllerError::IndexOutOfRange => write!(f, "No message at that position"),
            ControllerError::MissingCredential => {
                write!(f, "API key is required. Run `chatline auth <key>` first")
            }
            ControllerError::UnknownSession(id) => write!(f, "No chat with id {id}"),
        }
    }
}

impl StdError for ControllerError {}

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Replied(String),
    /// The fallback reply was appended in place of an answer.
    Failed(DeliveryError),
    Cancelled,
}

/// Effect of one event on the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The event belonged to a stopped or superseded exchange.
    Ignored,
    Chunk(String),
    /// Partial text was dropped because a retry started.
    Restart,
    Finished(ExchangeOutcome),
}

pub struct ConversationController {
    sessions: SessionStore,
    snapshots: ChatSnapshots,
    delivery: MessageDeliveryService,
    runner: ExchangeRunner,
    stream: bool,
    current_session_id: String,
    transcript: Vec<Turn>,
    draft: String,
    state: ConversationState,
    cancel_token: Option<CancellationToken>,
    next_exchange_id: u64,
}

impl ConversationController {
    /// Open the most recent session, creating one if the store is empty.
    ///
    /// Exchange events arrive on the returned receiver and must be fed back
    /// through [`apply_event`](Self::apply_event).
    pub fn new(
        mut sessions: SessionStore,
        snapshots: ChatSnapshots,
        delivery: MessageDeliveryService,
        stream: bool,
    ) -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let current = match sessions.get_sessions().into_iter().next() {
            Some(session) => session,
            None => sessions.create_session(),
        };
        let (runner, rx) = ExchangeRunner::new();
        let controller = Self {
            sessions,
            snapshots,
            delivery,
            runner,
            stream,
            current_session_id: current.id,
            transcript: current.turns,
            draft: String::new(),
            state: ConversationState::Idle,
            cancel_token: None,
            next_exchange_id: 1,
        };
        (controller, rx)
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, ConversationState::Awaiting { .. })
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Assistant text received so far for the in-flight exchange.
    pub fn draft(&self) -> Option<&str> {
        self.is_awaiting().then_some(self.draft.as_str())
    }

    pub fn current_session_id(&self) -> &str {
        &self.current_session_id
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.get_sessions()
    }

    pub fn snapshots(&self) -> &ChatSnapshots {
        &self.snapshots
    }

    pub fn delivery(&self) -> &MessageDeliveryService {
        &self.delivery
    }

    pub fn delivery_mut(&mut self) -> &mut MessageDeliveryService {
        &mut self.delivery
    }

    /// Append a user turn and start an exchange for it.
    pub fn submit(&mut self, input: &str) -> Result<u64, ControllerError> {
        self.ensure_idle()?;
        if input.trim().is_empty() {
            return Err(ControllerError::EmptyInput);
        }
        if !self.delivery.is_configured() {
            return Err(ControllerError::MissingCredential);
        }

        self.transcript.push(Turn::user(input));
        self.persist();
        Ok(self.start_exchange())
    }

    /// Fold one exchange event into the transcript.
    pub fn apply_event(&mut self, exchange_id: u64, message: StreamMessage) -> Applied {
        if self.state != (ConversationState::Awaiting { exchange_id }) {
            debug!(exchange_id, "Ignoring event for inactive exchange");
            return Applied::Ignored;
        }

        match message {
            StreamMessage::Chunk(text) => {
                self.draft.push_str(&text);
                Applied::Chunk(text)
            }
            StreamMessage::Restart => {
                self.draft.clear();
                Applied::Restart
            }
            StreamMessage::Done(text) => {
                self.finish_exchange();
                self.transcript.push(Turn::assistant(text.clone()));
                self.persist();
                Applied::Finished(ExchangeOutcome::Replied(text))
            }
            StreamMessage::Failed(DeliveryError::Cancelled) => {
                self.finish_exchange();
                Applied::Finished(ExchangeOutcome::Cancelled)
            }
            StreamMessage::Failed(err) => {
                debug!(exchange_id, error = %err, "Exchange failed; appending fallback");
                self.finish_exchange();
                self.transcript.push(Turn::fallback());
                self.persist();
                Applied::Finished(ExchangeOutcome::Failed(err))
            }
        }
    }

    /// Cancel the in-flight exchange and return to Idle at once. Later
    /// events from it are ignored.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        let ConversationState::Awaiting { exchange_id } = self.state else {
            return Err(ControllerError::NotAwaiting);
        };
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        debug!(exchange_id, "Exchange stopped");
        self.finish_exchange();
        Ok(())
    }

    pub fn start_edit(&mut self, index: usize) -> Result<(), ControllerError> {
        self.ensure_idle()?;
        let turn = self
            .transcript
            .get(index)
            .ok_or(ControllerError::IndexOutOfRange)?;
        if !turn.is_user() {
            return Err(ControllerError::NotEditable);
        }
        self.state = ConversationState::Editing {
            index,
            draft: turn.content.clone(),
        };
        Ok(())
    }

    pub fn update_edit_draft(&mut self, text: impl Into<String>) -> Result<(), ControllerError> {
        match &mut self.state {
            ConversationState::Editing { draft, .. } => {
                *draft = text.into();
                Ok(())
            }
            _ => Err(ControllerError::NotEditing),
        }
    }

    /// Replace the edited turn, drop everything after it and resubmit.
    pub fn save_edit(&mut self) -> Result<u64, ControllerError> {
        let ConversationState::Editing { index, draft } = &self.state else {
            return Err(ControllerError::NotEditing);
        };
        if draft.trim().is_empty() {
            return Err(ControllerError::EmptyInput);
        }
        if !self.delivery.is_configured() {
            return Err(ControllerError::MissingCredential);
        }
        let (index, content) = (*index, draft.clone());

        self.transcript.truncate(index + 1);
        self.transcript[index].content = content;
        self.state = ConversationState::Idle;
        self.persist();
        Ok(self.start_exchange())
    }

    pub fn cancel_edit(&mut self) -> Result<(), ControllerError> {
        if !matches!(self.state, ConversationState::Editing { .. }) {
            return Err(ControllerError::NotEditing);
        }
        self.state = ConversationState::Idle;
        Ok(())
    }

    /// Start a fresh empty session and make it current.
    pub fn new_session(&mut self) -> Session {
        self.abandon_activity();
        let session = self.sessions.create_session();
        self.open(session.clone());
        session
    }

    pub fn switch_session(&mut self, id: &str) -> Result<(), ControllerError> {
        let session = self
            .sessions
            .get_session(id)
            .ok_or_else(|| ControllerError::UnknownSession(id.to_string()))?;
        self.abandon_activity();
        self.open(session);
        Ok(())
    }

    /// Delete a session and its snapshot. A session always remains: deleting
    /// the last one creates a new empty session.
    pub fn delete_session(&mut self, id: &str) {
        let is_current = id == self.current_session_id;
        if is_current {
            self.abandon_activity();
        }
        self.sessions.delete_session(id);
        self.snapshots.remove(id);

        if self.sessions.is_empty() {
            let session = self.sessions.create_session();
            self.open(session);
        } else if is_current {
            if let Some(session) = self.sessions.get_sessions().into_iter().next() {
                self.open(session);
            }
        }
    }

    /// Open the chat behind a resume link, restoring its session from the
    /// snapshot when the session list no longer has it.
    pub fn resume(&mut self, chat_id: &str) -> Result<(), ControllerError> {
        if self.sessions.get_session(chat_id).is_none() {
            let snapshot = self
                .snapshots
                .load(chat_id)
                .ok_or_else(|| ControllerError::UnknownSession(chat_id.to_string()))?;
            self.sessions.restore_session(chat_id, snapshot.messages);
        }
        self.switch_session(chat_id)
    }

    fn ensure_idle(&self) -> Result<(), ControllerError> {
        match self.state {
            ConversationState::Idle => Ok(()),
            ConversationState::Awaiting { .. } => Err(ControllerError::Busy),
            ConversationState::Editing { .. } => Err(ControllerError::EditInProgress),
        }
    }

    fn start_exchange(&mut self) -> u64 {
        let exchange_id = self.next_exchange_id;
        self.next_exchange_id += 1;

        let token = CancellationToken::new();
        self.cancel_token = Some(token.clone());
        self.draft.clear();
        self.state = ConversationState::Awaiting { exchange_id };

        debug!(
            exchange_id,
            session_id = %self.current_session_id,
            turns = self.transcript.len(),
            "Starting exchange"
        );
        self.runner.spawn_exchange(
            self.delivery.clone(),
            ExchangeRequest {
                stream_id: exchange_id,
                turns: self.transcript.clone(),
                cancel_token: token,
                stream: self.stream,
            },
        );
        exchange_id
    }

    fn finish_exchange(&mut self) {
        self.cancel_token = None;
        self.draft.clear();
        self.state = ConversationState::Idle;
    }

    fn abandon_activity(&mut self) {
        match self.state {
            ConversationState::Awaiting { .. } => {
                let _ = self.stop();
            }
            ConversationState::Editing { .. } => self.state = ConversationState::Idle,
            ConversationState::Idle => {}
        }
    }

    fn open(&mut self, session: Session) {
        self.current_session_id = session.id;
        self.transcript = session.turns;
        self.draft.clear();
    }

    fn persist(&mut self) {
        self.sessions.update_session(
            &self.current_session_id,
            SessionUpdate::transcript(self.transcript.clone()),
        );
        self.snapshots.save(&self.current_session_id, &self.transcript);
    }
}
