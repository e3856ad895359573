//! A terminal chat room that streams model answers into persisted
//! conversations.
//!
//! The crate includes a CLI tool for using in the terminal. It can also be
//! used as a library: [`AppConfig`] wires an HTTP backend and on-disk
//! storage into a [`core::ChatClientBuilder`].

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod config;

pub use config::{AppConfig, ConfigError};

/// Re-exports of [`chatroom_core`] crate.
pub mod core {
    pub use chatroom_core::*;
}

/// Re-exports of [`chatroom_http_backend`] crate.
pub mod http {
    pub use chatroom_http_backend::*;
}
