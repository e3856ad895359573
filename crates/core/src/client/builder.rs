use chatroom_model::ChatBackend;

use super::ChatClient;
use super::state::{ChangeCallback, ClientState, SessionEndCallback};
use crate::backend_client::BackendClient;
use crate::conversation::{ConversationId, MessageLog};
use crate::session::SessionOutcome;
use crate::store::{ConversationStore, MemoryStorage, Storage};

/// [`ChatClient`] builder.
pub struct ChatClientBuilder {
    backend: BackendClient,
    storage: Option<Box<dyn Storage>>,
    on_change: Option<ChangeCallback>,
    on_session_end: Option<SessionEndCallback>,
}

impl ChatClientBuilder {
    /// Creates a new builder with the specified backend.
    #[inline]
    pub fn with_backend<B: ChatBackend + 'static>(backend: B) -> Self
    where
        B::Stream: 'static,
    {
        Self {
            backend: BackendClient::new(backend),
            storage: None,
            on_change: None,
            on_session_end: None,
        }
    }

    /// Sets where conversations are persisted. Without a storage, they
    /// are kept in memory only.
    #[inline]
    pub fn with_storage<S: Storage + 'static>(mut self, storage: S) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Attaches a callback to be invoked whenever the messages of a
    /// conversation change.
    ///
    /// The callback runs on the client task and should return quickly.
    #[inline]
    pub fn on_change(
        mut self,
        on_change: impl Fn(ConversationId, &MessageLog) + Send + Sync + 'static,
    ) -> Self {
        self.on_change = Some(Box::new(on_change));
        self
    }

    /// Attaches a callback to be invoked when a session ends.
    #[inline]
    pub fn on_session_end(
        mut self,
        on_session_end: impl Fn(ConversationId, &SessionOutcome)
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.on_session_end = Some(Box::new(on_session_end));
        self
    }

    /// Loads the stored conversations and starts the client.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn build(self) -> ChatClient {
        let ChatClientBuilder {
            backend,
            storage,
            on_change,
            on_session_end,
        } = self;

        let storage: Box<dyn Storage> = match storage {
            Some(storage) => storage,
            None => Box::new(MemoryStorage::new()),
        };
        let mut state =
            ClientState::new(ConversationStore::open_boxed(storage), backend);
        state.on_change = on_change;
        state.on_session_end = on_session_end;
        ChatClient::spawn(state)
    }
}
