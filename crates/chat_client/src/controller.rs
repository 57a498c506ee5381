//! Request orchestration for one chat session.
//!
//! A [`ChatController`] owns the transcript, runs at most one request at a
//! time and publishes a revision number on every visible change so a UI can
//! redraw without polling.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use wire_protocol::{Attachments, ChatRequest, Message, WireFrame};

use crate::cancel::{await_or_cancel, is_cancelled, new_cancel_signal, raise, CancelSignal};
use crate::conversation::{Conversation, FrameEffect, StreamError};
use crate::credentials::{require_token, CredentialProvider};
use crate::error::ClientError;
use crate::reader::{ReadOutcome, StreamReader};
use crate::transport::{ChatTransport, QuotaSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    Sending,
    Streaming,
    Done,
    Errored,
    Aborted,
}

impl RequestPhase {
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

/// Text and images for one user turn.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub text: String,
    /// Inline images, typically data URLs.
    pub images: Vec<String>,
    /// Images already uploaded elsewhere.
    pub image_urls: Vec<String>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_urls.push(url.into());
        self
    }

    pub fn with_image(mut self, data_url: impl Into<String>) -> Self {
        self.images.push(data_url.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.images.is_empty() && self.image_urls.is_empty()
    }
}

struct ControllerState {
    session_id: String,
    conversation: Conversation,
    phase: RequestPhase,
    error: Option<String>,
    cancel: Option<CancelSignal>,
    quota: Option<QuotaSnapshot>,
}

pub struct ChatController {
    transport: Arc<dyn ChatTransport>,
    credentials: Arc<dyn CredentialProvider>,
    state: Mutex<ControllerState>,
    revisions: watch::Sender<u64>,
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock_unpoisoned(&self.state);
        f.debug_struct("ChatController")
            .field("session_id", &state.session_id)
            .field("phase", &state.phase)
            .field("messages", &state.conversation.len())
            .finish_non_exhaustive()
    }
}

impl ChatController {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        credentials: Arc<dyn CredentialProvider>,
        session_id: impl Into<String>,
    ) -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            transport,
            credentials,
            state: Mutex::new(ControllerState {
                session_id: session_id.into(),
                conversation: Conversation::new(),
                phase: RequestPhase::Idle,
                error: None,
                cancel: None,
                quota: None,
            }),
            revisions,
        }
    }

    /// Controller with a freshly generated session id.
    pub fn with_new_session(
        transport: Arc<dyn ChatTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self::new(transport, credentials, new_session_id())
    }

    pub fn session_id(&self) -> String {
        lock_unpoisoned(&self.state).session_id.clone()
    }

    pub fn phase(&self) -> RequestPhase {
        lock_unpoisoned(&self.state).phase
    }

    pub fn messages(&self) -> Vec<Message> {
        lock_unpoisoned(&self.state).conversation.messages().to_vec()
    }

    /// Last failure message. Never set by a user cancellation.
    pub fn error(&self) -> Option<String> {
        lock_unpoisoned(&self.state).error.clone()
    }

    pub fn quota(&self) -> Option<QuotaSnapshot> {
        lock_unpoisoned(&self.state).quota.clone()
    }

    /// Receives the transcript revision after every visible change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    pub async fn submit(&self, text: impl Into<String>) -> Result<RequestPhase, ClientError> {
        self.submit_input(UserInput::text(text)).await
    }

    /// Runs one request to completion and returns its terminal phase.
    ///
    /// Only [`ClientError::Busy`] and [`ClientError::EmptyInput`] are returned
    /// as errors; every other failure lands in [`ChatController::error`] with
    /// the phase set to [`RequestPhase::Errored`].
    pub async fn submit_input(&self, input: UserInput) -> Result<RequestPhase, ClientError> {
        if input.is_empty() {
            return Err(ClientError::EmptyInput);
        }

        let (request, assistant_id, cancel) = {
            let mut state = lock_unpoisoned(&self.state);
            if state.phase.is_in_flight() {
                return Err(ClientError::Busy);
            }

            let cancel = new_cancel_signal();
            state.phase = RequestPhase::Sending;
            state.error = None;
            state.cancel = Some(Arc::clone(&cancel));

            let user = Message::user(new_message_id(), input.text.trim()).with_attachments(
                Attachments {
                    images: input.images.clone(),
                },
            );
            state.conversation.push(user);

            let request = ChatRequest {
                messages: state.conversation.messages().to_vec(),
                session_id: Some(state.session_id.clone()),
                images: non_empty(input.images),
                image_urls: non_empty(input.image_urls),
            };

            let assistant_id = new_message_id();
            state
                .conversation
                .push(Message::assistant(assistant_id.clone(), ""));
            self.publish(&state);
            (request, assistant_id, cancel)
        };

        let guard = InFlightGuard::new(self, assistant_id, cancel);
        let result = self
            .drive(&request, &guard.assistant_id, &guard.cancel)
            .await;
        Ok(guard.settle(result))
    }

    /// Stops the in-flight request, keeping whatever text already arrived.
    ///
    /// Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        let state = lock_unpoisoned(&self.state);
        match state.cancel.as_ref() {
            Some(cancel) if state.phase.is_in_flight() => {
                raise(cancel);
                true
            }
            _ => false,
        }
    }

    /// Replaces the transcript with the server's stored history for this session.
    pub async fn load_history(&self) -> Result<usize, ClientError> {
        let session_id = {
            let state = lock_unpoisoned(&self.state);
            if state.phase.is_in_flight() {
                return Err(ClientError::Busy);
            }
            state.session_id.clone()
        };

        let token = require_token(self.credentials.as_ref()).await?;
        let messages = self.transport.history(&session_id, &token).await?;
        let count = messages.len();

        let mut state = lock_unpoisoned(&self.state);
        if state.phase.is_in_flight() {
            return Err(ClientError::Busy);
        }
        state.conversation.replace_all(messages);
        self.publish(&state);
        tracing::debug!(%session_id, count, "history loaded");
        Ok(count)
    }

    async fn drive(
        &self,
        request: &ChatRequest,
        assistant_id: &str,
        cancel: &CancelSignal,
    ) -> Result<ReadOutcome, ClientError> {
        // Fetched per request; tokens are never reused across turns.
        let token = await_or_cancel(require_token(self.credentials.as_ref()), cancel).await??;
        let response = self.transport.open(request, &token, cancel).await?;

        {
            let mut state = lock_unpoisoned(&self.state);
            state.phase = RequestPhase::Streaming;
            if response.quota.is_some() {
                state.quota = response.quota.clone();
            }
            self.publish(&state);
        }

        StreamReader::new()
            .read(response.body, cancel, |frame| {
                self.apply_frame(assistant_id, &frame)
            })
            .await
    }

    fn apply_frame(&self, assistant_id: &str, frame: &WireFrame) -> Result<(), ClientError> {
        let mut state = lock_unpoisoned(&self.state);
        match state.conversation.apply(assistant_id, frame) {
            Ok(FrameEffect::DuplicateCallIgnored | FrameEffect::OrphanResultDropped) => Ok(()),
            Ok(_) => {
                self.publish(&state);
                Ok(())
            }
            Err(StreamError::Server(message)) => Err(ClientError::Server(message)),
            Err(error @ StreamError::UnknownMessage(_)) => {
                Err(ClientError::Stream(error.to_string()))
            }
        }
    }

    fn finish(
        &self,
        assistant_id: &str,
        cancel: &CancelSignal,
        result: Result<ReadOutcome, ClientError>,
    ) -> RequestPhase {
        let mut state = lock_unpoisoned(&self.state);

        let phase = match result {
            Ok(ReadOutcome::Completed) => RequestPhase::Done,
            Ok(ReadOutcome::Cancelled) => RequestPhase::Aborted,
            Err(_) if is_cancelled(cancel) => RequestPhase::Aborted,
            Err(ClientError::Cancelled) => RequestPhase::Aborted,
            Err(error) => {
                tracing::warn!(session_id = %state.session_id, %error, "chat request failed");
                if let ClientError::RateLimited { reset_at, .. } = &error {
                    let limit = state.quota.as_ref().and_then(|quota| quota.limit);
                    state.quota = Some(QuotaSnapshot {
                        limit,
                        remaining: Some(0),
                        reset_at: reset_at.clone(),
                    });
                }
                state.error = Some(error.to_string());
                RequestPhase::Errored
            }
        };

        if phase != RequestPhase::Done {
            drop_untouched_placeholder(&mut state.conversation, assistant_id);
        }
        state.phase = phase;
        state.cancel = None;
        self.publish(&state);
        phase
    }

    fn publish(&self, state: &ControllerState) {
        self.revisions.send_replace(state.conversation.revision());
    }
}

/// Settles the in-flight request as aborted if `submit_input` is dropped
/// before the request reaches a terminal phase.
struct InFlightGuard<'a> {
    controller: &'a ChatController,
    assistant_id: String,
    cancel: CancelSignal,
    armed: bool,
}

impl<'a> InFlightGuard<'a> {
    fn new(controller: &'a ChatController, assistant_id: String, cancel: CancelSignal) -> Self {
        Self {
            controller,
            assistant_id,
            cancel,
            armed: true,
        }
    }

    fn settle(mut self, result: Result<ReadOutcome, ClientError>) -> RequestPhase {
        self.armed = false;
        self.controller
            .finish(&self.assistant_id, &self.cancel, result)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!("chat request dropped before completion");
        raise(&self.cancel);
        self.controller
            .finish(&self.assistant_id, &self.cancel, Ok(ReadOutcome::Cancelled));
    }
}

/// Removes the assistant placeholder when no frame ever reached it.
fn drop_untouched_placeholder(conversation: &mut Conversation, assistant_id: &str) {
    let untouched = conversation.get(assistant_id).is_some_and(|message| {
        message.text().is_empty() && message.tool_invocations().is_empty()
    });
    if !untouched {
        return;
    }

    let kept = conversation
        .messages()
        .iter()
        .filter(|message| message.id() != assistant_id)
        .cloned()
        .collect();
    conversation.replace_all(kept);
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
