//! A chat backend that talks to an HTTP endpoint streaming
//! `text/event-stream` responses.

#[macro_use]
extern crate tracing;

mod config;
mod io;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use chatroom_model::{BackendError, ChatBackend, ChatRequest, ErrorKind};
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};

pub use config::{HttpBackendConfig, HttpBackendConfigBuilder};
pub use io::ResponseChunks;

/// Error type for [`HttpBackend`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            ErrorKind::RateLimitExceeded
        } else if err.is_connect() || err.is_timeout() {
            ErrorKind::Unavailable
        } else {
            ErrorKind::Other
        };
        Self::new(format!("{err}"), kind)
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Chat backend reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    config: Arc<HttpBackendConfig>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` with the given configuration.
    #[inline]
    pub fn new(config: HttpBackendConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ChatBackend for HttpBackend {
    type Error = Error;
    type Stream = ResponseChunks;

    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        debug!(
            "posting prompt with {} history entries to {}",
            req.history.len(),
            self.config.endpoint
        );
        let resp_fut = self
            .client
            .post(&self.config.endpoint)
            .header(header::USER_AGENT, &self.config.user_agent)
            .header(header::ACCEPT, "text/event-stream")
            .json(req)
            .send();

        async move {
            let resp = resp_fut
                .await
                .and_then(Response::error_for_status)
                .map_err(Error::from_reqwest)?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            if !is_event_stream(content_type) {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            Ok(ResponseChunks::from_response(resp))
        }
    }
}

fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|v| v.parse().ok())
        .map(|m: Mime| {
            m.type_() == mime::TEXT && m.subtype() == mime::EVENT_STREAM
        })
        .unwrap_or(false)
}
