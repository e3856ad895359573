use std::collections::HashMap;
use std::fmt::{self, Debug};

use chatroom_model::{ChatRequest, HistoryEntry};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{ChatClient, ClientError, Command};
use crate::backend_client::BackendClient;
use crate::conversation::{ConversationId, MessageLog, Role};
use crate::session::{
    APOLOGY, SessionEvent, SessionOutcome, SessionState, run_session,
};
use crate::store::ConversationStore;

pub(super) type ChangeCallback =
    Box<dyn Fn(ConversationId, &MessageLog) + Send + Sync>;
pub(super) type SessionEndCallback =
    Box<dyn Fn(ConversationId, &SessionOutcome) + Send + Sync>;

struct Session {
    id: u64,
    state: SessionState,
    task: Option<JoinHandle<()>>,
}

/// Everything owned by the client task.
pub(super) struct ClientState {
    pub(super) store: ConversationStore,
    pub(super) backend: BackendClient,
    sessions: HashMap<ConversationId, Session>,
    next_session_id: u64,

    pub(super) on_change: Option<ChangeCallback>,
    pub(super) on_session_end: Option<SessionEndCallback>,
}

impl ClientState {
    pub(super) fn new(store: ConversationStore, backend: BackendClient) -> Self {
        Self {
            store,
            backend,
            sessions: HashMap::new(),
            next_session_id: 1,
            on_change: None,
            on_session_end: None,
        }
    }

    pub(super) fn session_state(&self, id: ConversationId) -> SessionState {
        self.sessions
            .get(&id)
            .map(|session| session.state)
            .unwrap_or_default()
    }

    fn submit(
        &mut self,
        prompt: String,
        client: &ChatClient,
    ) -> Result<ConversationId, ClientError> {
        if prompt.trim().is_empty() {
            return Err(ClientError::EmptyPrompt);
        }
        let id = self
            .store
            .active_id()
            .ok_or(ClientError::NoActiveConversation)?;
        if self.session_state(id).is_in_flight() {
            return Err(ClientError::SessionInFlight(id));
        }

        // The backend adds the prompt to the history by itself.
        let history = self
            .store
            .log(id)
            .map(|log| {
                log.iter()
                    .map(|msg| HistoryEntry {
                        role: msg.role(),
                        content: msg.content().to_owned(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let changed = self.store.append_to(id, Role::User, prompt.clone());
        self.publish(id, changed);
        let changed = self.store.append_to(id, Role::Assistant, "");
        self.publish(id, changed);

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        let req = ChatRequest { prompt, history };
        let backend = self.backend.clone();
        let client = client.downgrade();
        let task = tokio::spawn(
            run_session(backend, req, move |event| {
                client.send(SessionUpdate {
                    conversation: id,
                    session_id,
                    event,
                });
            })
            .instrument(debug_span!("session", %id, session_id)),
        );
        debug!("session {session_id} started in {id}");
        self.sessions.insert(
            id,
            Session {
                id: session_id,
                state: SessionState::Sending,
                task: Some(task),
            },
        );
        Ok(id)
    }

    fn handle_session_event(
        &mut self,
        id: ConversationId,
        session_id: u64,
        event: SessionEvent,
    ) {
        let Some(session) = self.sessions.get_mut(&id) else {
            trace!("conversation {id} is gone, dropping {event:?}");
            return;
        };
        if session.id != session_id || !session.state.is_in_flight() {
            trace!("session {session_id} is over, dropping {event:?}");
            return;
        }

        match event {
            SessionEvent::Streaming => {
                self.set_session_state(id, SessionState::Streaming);
            }
            SessionEvent::Delta(text) => {
                let changed = self.store.apply_delta_to(id, &text);
                self.publish(id, changed);
            }
            SessionEvent::Finished => {
                self.set_session_state(id, SessionState::Finalizing);
                let changed = self.store.finalize_conversation(id);
                self.publish(id, changed);
                self.end_session(id, SessionOutcome::Completed);
            }
            SessionEvent::Failed(err) => {
                error!("session {session_id} in {id} failed: {err}");
                self.set_session_state(id, SessionState::Errored);

                let has_partial = self
                    .store
                    .log(id)
                    .and_then(MessageLog::last)
                    .is_some_and(|msg| !msg.raw().is_empty());
                let apology = if has_partial {
                    format!("\n\n{APOLOGY}")
                } else {
                    APOLOGY.to_owned()
                };
                let changed = self.store.apply_delta_to(id, &apology);
                self.publish(id, changed);
                let changed = self.store.finalize_conversation(id);
                self.publish(id, changed);
                self.end_session(id, SessionOutcome::Errored(err));
            }
        }
    }

    /// Aborts the session running in `id`. Returns `false` if there was
    /// none.
    fn cancel_session(&mut self, id: ConversationId) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if !session.state.is_in_flight() {
            return false;
        }
        if let Some(task) = session.task.take() {
            task.abort();
        }
        self.end_session(id, SessionOutcome::Cancelled);
        true
    }

    fn end_session(&mut self, id: ConversationId, outcome: SessionOutcome) {
        if let Some(session) = self.sessions.get_mut(&id) {
            // A finished task is about to return by itself.
            session.task = None;
        }
        self.set_session_state(id, SessionState::Done);
        if let Some(on_session_end) = &self.on_session_end {
            on_session_end(id, &outcome);
        }
    }

    fn set_session_state(&mut self, id: ConversationId, state: SessionState) {
        if let Some(session) = self.sessions.get_mut(&id) {
            debug!("session {} in {id}: {:?} -> {state:?}", session.id, session.state);
            session.state = state;
        }
    }

    /// Notifies the observer of a new log value.
    fn publish(&self, id: ConversationId, changed: Option<MessageLog>) {
        if let (Some(log), Some(on_change)) = (changed, &self.on_change) {
            on_change(id, &log);
        }
    }

    fn delete(&mut self, id: ConversationId) -> Result<(), ClientError> {
        if self.store.meta(id).is_none() {
            return Err(ClientError::UnknownConversation(id));
        }
        self.cancel_session(id);
        self.sessions.remove(&id);
        self.store.delete(id)?;
        Ok(())
    }

    fn clear_active(&mut self) -> Result<(), ClientError> {
        let id = self
            .store
            .active_id()
            .ok_or(ClientError::NoActiveConversation)?;
        if self.session_state(id).is_in_flight() {
            return Err(ClientError::SessionInFlight(id));
        }
        let changed = self.store.clear();
        self.publish(id, changed);
        Ok(())
    }
}

impl Drop for ClientState {
    fn drop(&mut self) {
        for session in self.sessions.values_mut() {
            if let Some(task) = session.task.take() {
                task.abort();
            }
        }
    }
}

#[derive(Debug)]
pub(super) struct CreateConversation {
    pub reply: oneshot::Sender<ConversationId>,
}

impl Command for CreateConversation {
    fn handle(self: Box<Self>, state: &mut ClientState, _client: &ChatClient) {
        let id = state.store.create();
        self.reply.send(id).ok();
    }
}

#[derive(Debug)]
pub(super) struct SelectConversation {
    pub id: ConversationId,
    pub reply: oneshot::Sender<Result<(), ClientError>>,
}

impl Command for SelectConversation {
    fn handle(self: Box<Self>, state: &mut ClientState, _client: &ChatClient) {
        let result = state.store.select(self.id).map_err(Into::into);
        self.reply.send(result).ok();
    }
}

#[derive(Debug)]
pub(super) struct DeleteConversation {
    pub id: ConversationId,
    pub reply: oneshot::Sender<Result<(), ClientError>>,
}

impl Command for DeleteConversation {
    fn handle(self: Box<Self>, state: &mut ClientState, _client: &ChatClient) {
        self.reply.send(state.delete(self.id)).ok();
    }
}

#[derive(Debug)]
pub(super) struct RenameConversation {
    pub id: ConversationId,
    pub name: String,
    pub reply: oneshot::Sender<Result<(), ClientError>>,
}

impl Command for RenameConversation {
    fn handle(self: Box<Self>, state: &mut ClientState, _client: &ChatClient) {
        let result = state.store.rename(self.id, self.name).map_err(Into::into);
        self.reply.send(result).ok();
    }
}

#[derive(Debug)]
pub(super) struct ClearActive {
    pub reply: oneshot::Sender<Result<(), ClientError>>,
}

impl Command for ClearActive {
    fn handle(self: Box<Self>, state: &mut ClientState, _client: &ChatClient) {
        self.reply.send(state.clear_active()).ok();
    }
}

#[derive(Debug)]
pub(super) struct Submit {
    pub prompt: String,
    pub reply: oneshot::Sender<Result<ConversationId, ClientError>>,
}

impl Command for Submit {
    fn handle(self: Box<Self>, state: &mut ClientState, client: &ChatClient) {
        let Submit { prompt, reply } = *self;
        reply.send(state.submit(prompt, client)).ok();
    }
}

#[derive(Debug)]
pub(super) struct Cancel {
    pub reply: oneshot::Sender<Result<bool, ClientError>>,
}

impl Command for Cancel {
    fn handle(self: Box<Self>, state: &mut ClientState, _client: &ChatClient) {
        let result = state
            .store
            .active_id()
            .ok_or(ClientError::NoActiveConversation)
            .map(|id| state.cancel_session(id));
        self.reply.send(result).ok();
    }
}

#[derive(Debug)]
struct SessionUpdate {
    conversation: ConversationId,
    session_id: u64,
    event: SessionEvent,
}

impl Command for SessionUpdate {
    #[inline]
    fn handle(self: Box<Self>, state: &mut ClientState, _client: &ChatClient) {
        state.handle_session_event(self.conversation, self.session_id, self.event);
    }
}

/// Runs a closure against the state and sends back its result.
pub(super) struct Inspect<F, T> {
    f: F,
    reply: oneshot::Sender<T>,
}

impl<F, T> Inspect<F, T> {
    #[inline]
    pub fn new(f: F, reply: oneshot::Sender<T>) -> Self {
        Self { f, reply }
    }
}

impl<F, T> Debug for Inspect<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inspect").finish_non_exhaustive()
    }
}

impl<F, T> Command for Inspect<F, T>
where
    F: FnOnce(&mut ClientState) -> T + Send + 'static,
    T: Send + 'static,
{
    fn handle(self: Box<Self>, state: &mut ClientState, _client: &ChatClient) {
        let Inspect { f, reply } = *self;
        reply.send(f(state)).ok();
    }
}
