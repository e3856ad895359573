mod builder;
mod state;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display};
use std::sync::{Arc, Weak};

use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::conversation::{ConversationId, ConversationMeta, MessageLog};
use crate::session::SessionState;
use crate::store::UnknownConversation;
pub use builder::ChatClientBuilder;
use state::{
    Cancel, ClearActive, ClientState, CreateConversation, DeleteConversation,
    Inspect, RenameConversation, SelectConversation, Submit,
};

/// Errors returned by [`ChatClient`] operations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClientError {
    /// The client task has stopped.
    Closed,
    /// No conversation has the given id.
    UnknownConversation(ConversationId),
    /// The operation needs an active conversation, but there is none.
    NoActiveConversation,
    /// The prompt is empty or only whitespace.
    EmptyPrompt,
    /// The conversation is still waiting for an answer.
    SessionInFlight(ConversationId),
}

impl Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Closed => write!(f, "the chat client has stopped"),
            ClientError::UnknownConversation(id) => {
                write!(f, "unknown conversation {id}")
            }
            ClientError::NoActiveConversation => {
                write!(f, "no conversation is active")
            }
            ClientError::EmptyPrompt => write!(f, "the prompt is empty"),
            ClientError::SessionInFlight(id) => {
                write!(f, "conversation {id} is still waiting for an answer")
            }
        }
    }
}

impl StdError for ClientError {}

impl From<UnknownConversation> for ClientError {
    #[inline]
    fn from(err: UnknownConversation) -> Self {
        ClientError::UnknownConversation(err.0)
    }
}

/// A command processed by the client task.
trait Command: Send + Debug + 'static {
    fn handle(self: Box<Self>, state: &mut ClientState, client: &ChatClient);
}

struct Mailbox {
    cmd_tx: mpsc::UnboundedSender<Box<dyn Command>>,
    kill_tx: watch::Sender<bool>,
}

/// A handle to a chat client, which owns the conversations and runs the
/// sessions against the backend.
///
/// All operations are processed one at a time by a single task, in the
/// order they were sent. Sessions stream in their own tasks, so every
/// operation stays available while an answer is arriving.
///
/// Clones refer to the same client. The client stops when the last
/// handle is dropped or [`ChatClient::shutdown`] is called, and every
/// running session is aborted with it.
#[derive(Clone)]
pub struct ChatClient {
    mailbox: Arc<Mailbox>,
}

/// A handle that does not keep the client alive.
#[derive(Clone)]
struct WeakChatClient {
    mailbox: Weak<Mailbox>,
}

impl WeakChatClient {
    fn send<C: Command>(&self, cmd: C) {
        if let Some(mailbox) = self.mailbox.upgrade() {
            mailbox.cmd_tx.send(Box::new(cmd)).ok();
        }
    }
}

impl ChatClient {
    fn spawn(state: ClientState) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = watch::channel(false);
        let mailbox = Arc::new(Mailbox { cmd_tx, kill_tx });
        tokio::spawn(
            run_client(Arc::downgrade(&mailbox), state, cmd_rx, kill_rx)
                .instrument(debug_span!("chat client")),
        );
        Self { mailbox }
    }

    #[inline]
    fn downgrade(&self) -> WeakChatClient {
        WeakChatClient {
            mailbox: Arc::downgrade(&self.mailbox),
        }
    }

    #[inline]
    fn send<C: Command>(&self, cmd: C) -> Result<(), ClientError> {
        self.mailbox
            .cmd_tx
            .send(Box::new(cmd))
            .map_err(|_| ClientError::Closed)
    }

    async fn call<T, C, F>(&self, make_cmd: F) -> Result<T, ClientError>
    where
        C: Command,
        F: FnOnce(oneshot::Sender<T>) -> C,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make_cmd(reply_tx))?;
        reply_rx.await.map_err(|_| ClientError::Closed)
    }

    async fn inspect<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut ClientState) -> T + Send + 'static,
    ) -> Result<T, ClientError> {
        self.call(|reply| Inspect::new(f, reply)).await
    }

    /// Creates an empty conversation, makes it active and returns its id.
    pub async fn create(&self) -> Result<ConversationId, ClientError> {
        self.call(|reply| CreateConversation { reply }).await
    }

    /// Makes `id` the active conversation.
    pub async fn select(&self, id: ConversationId) -> Result<(), ClientError> {
        self.call(|reply| SelectConversation { id, reply }).await?
    }

    /// Deletes a conversation. A session running in it is cancelled.
    pub async fn delete(&self, id: ConversationId) -> Result<(), ClientError> {
        self.call(|reply| DeleteConversation { id, reply }).await?
    }

    /// Changes the display name of a conversation.
    pub async fn rename(
        &self,
        id: ConversationId,
        name: impl Into<String>,
    ) -> Result<(), ClientError> {
        let name = name.into();
        self.call(|reply| RenameConversation { id, name, reply })
            .await?
    }

    /// Removes every message of the active conversation.
    ///
    /// Rejected while the conversation is waiting for an answer.
    pub async fn clear(&self) -> Result<(), ClientError> {
        self.call(|reply| ClearActive { reply }).await?
    }

    /// Sends a prompt in the active conversation.
    ///
    /// Returns as soon as the prompt and an empty answer have been added
    /// to the conversation; the answer then streams in the background.
    /// Returns the id of the conversation the answer will land in.
    pub async fn submit(
        &self,
        prompt: impl Into<String>,
    ) -> Result<ConversationId, ClientError> {
        let prompt = prompt.into();
        self.call(|reply| Submit { prompt, reply }).await?
    }

    /// Aborts the session of the active conversation, keeping whatever
    /// part of the answer has arrived.
    ///
    /// Returns `false` if no session was running.
    pub async fn cancel(&self) -> Result<bool, ClientError> {
        self.call(|reply| Cancel { reply }).await?
    }

    /// Returns every conversation, newest first.
    pub async fn conversations(
        &self,
    ) -> Result<Vec<ConversationMeta>, ClientError> {
        self.inspect(|state| state.store.conversations().to_vec())
            .await
    }

    /// Returns the id of the active conversation.
    pub async fn active_id(
        &self,
    ) -> Result<Option<ConversationId>, ClientError> {
        self.inspect(|state| state.store.active_id()).await
    }

    /// Returns the messages of the active conversation.
    pub async fn active_log(&self) -> Result<Option<MessageLog>, ClientError> {
        self.inspect(|state| state.store.active_log().cloned()).await
    }

    /// Returns the messages of a conversation.
    pub async fn log(
        &self,
        id: ConversationId,
    ) -> Result<Option<MessageLog>, ClientError> {
        self.inspect(move |state| state.store.log(id).cloned()).await
    }

    /// Returns where the session of a conversation is.
    pub async fn session_state(
        &self,
        id: ConversationId,
    ) -> Result<SessionState, ClientError> {
        self.inspect(move |state| state.session_state(id)).await
    }

    /// Stops the client.
    ///
    /// The client is not guaranteed to stop immediately, but it will not
    /// process further operations.
    #[inline]
    pub fn shutdown(&self) {
        self.mailbox.kill_tx.send(true).ok();
    }
}

impl Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("closed", &self.mailbox.cmd_tx.is_closed())
            .finish()
    }
}

async fn run_client(
    mailbox: Weak<Mailbox>,
    mut state: ClientState,
    mut cmd_rx: mpsc::UnboundedReceiver<Box<dyn Command>>,
    mut kill_rx: watch::Receiver<bool>,
) {
    debug!("started");
    loop {
        let cmd = select! {
            biased;

            _ = kill_rx.changed() => {
                break;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                cmd
            }
        };
        trace!("received command: {cmd:?}");

        let Some(mailbox) = mailbox.upgrade() else {
            debug!("last handle has been dropped, discard the command");
            break;
        };
        let client = ChatClient { mailbox };
        trace_span!("proc cmd").in_scope(|| {
            cmd.handle(&mut state, &client);
        });
    }
    debug!("will terminate");
}
