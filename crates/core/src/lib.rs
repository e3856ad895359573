//! Core logic of the chat room: turning streamed model output into
//! persisted conversations.
//!
//! A [`ChatClient`] owns a [`ConversationStore`] and runs one session per
//! submitted prompt. The session reads the backend's event stream with a
//! [`io::FrameReader`], parses every line with [`frame::parse_frame`] and
//! folds the payloads into the conversation with [`reducer::reduce`].
//! Once the answer is complete, [`extract::extract`] splits the model's
//! reasoning from its result.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod backend_client;
mod client;
pub mod conversation;
mod error;
pub mod extract;
pub mod frame;
pub mod io;
pub mod reducer;
mod session;
pub mod store;

pub use client::{ChatClient, ChatClientBuilder, ClientError};
pub use conversation::{
    ConversationId, ConversationMeta, Message, MessageLog, Role,
};
pub use error::TransportError;
pub use session::{SessionOutcome, SessionState};
pub use store::{
    ConversationStore, JsonDirStorage, MemoryStorage, Storage, StorageError,
    UnknownConversation,
};
