/// Builder for [`HttpBackendConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HttpBackendConfigBuilder {
    endpoint: String,
    user_agent: Option<String>,
}

impl HttpBackendConfigBuilder {
    /// Creates a builder with the URL of the chat endpoint.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            user_agent: None,
        }
    }

    /// Sets a custom `User-Agent` header.
    #[inline]
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> HttpBackendConfig {
        HttpBackendConfig {
            endpoint: self.endpoint,
            user_agent: self.user_agent.unwrap_or_else(|| {
                concat!("chatroom/", env!("CARGO_PKG_VERSION")).to_owned()
            }),
        }
    }
}

/// Configuration for the HTTP backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HttpBackendConfig {
    pub(crate) endpoint: String,
    pub(crate) user_agent: String,
}

impl HttpBackendConfig {
    /// Returns the URL of the chat endpoint.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
