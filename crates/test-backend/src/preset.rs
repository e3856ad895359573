use serde::{Deserialize, Serialize};
use serde_json::json;

/// What the backend does once a request reaches it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresetFailure {
    /// The body is delivered completely.
    #[default]
    None,
    /// The request is rejected before any body is available.
    OnSend,
    /// Reading the body fails after `chunks` chunks were delivered.
    AfterChunks {
        /// Number of chunks delivered before the failure.
        chunks: usize,
    },
    /// The body never ends after all chunks were delivered.
    Stall,
}

/// The preset response for one request.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct PresetResponse {
    /// Body chunks, delivered one per read.
    pub chunks: Vec<String>,
    /// How the response misbehaves, if at all.
    #[serde(default)]
    pub failure: PresetFailure,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified raw body chunks.
    #[inline]
    pub fn with_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            failure: PresetFailure::None,
        }
    }

    /// Creates a response that sends one `data:` frame per delta, each in
    /// its own chunk, followed by the `[DONE]` sentinel.
    pub fn with_deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut chunks: Vec<String> = deltas
            .into_iter()
            .map(|delta| {
                let payload = json!({ "content": delta.as_ref() });
                format!("data: {payload}\n\n")
            })
            .collect();
        chunks.push("data: [DONE]\n\n".to_owned());
        Self::with_chunks(chunks)
    }

    /// Makes the request fail before a body is available.
    #[inline]
    pub fn fail_on_send(mut self) -> Self {
        self.failure = PresetFailure::OnSend;
        self
    }

    /// Makes reading the body fail after `chunks` chunks.
    #[inline]
    pub fn fail_after(mut self, chunks: usize) -> Self {
        self.failure = PresetFailure::AfterChunks { chunks };
        self
    }

    /// Keeps the body open forever after the last chunk.
    #[inline]
    pub fn stall(mut self) -> Self {
        self.failure = PresetFailure::Stall;
        self
    }
}
