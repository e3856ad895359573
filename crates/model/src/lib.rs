//! The protocol between a chat client and a streaming chat backend.
//!
//! A backend accepts a [`ChatRequest`] and answers with a [`ByteStream`],
//! the raw body of a `text/event-stream` response. This crate says
//! nothing about how the bytes are framed or interpreted; that is the
//! job of the client that consumes the stream.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod backend;
mod error;
mod request;
mod stream;

pub use backend::*;
pub use error::*;
pub use request::*;
pub use stream::*;
