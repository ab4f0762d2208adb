//! Client configuration.
//!
//! [`ClientOptions`] is the resolved configuration bundle a [`Client`] is built
//! from. It is assembled once by the host application and never read
//! dynamically afterwards: every request issued by a client sees the same
//! base URL, default headers and middleware stack.
//!
//! [`Client`]: crate::client::Client

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::apps::{ChatApp, CompletionApp};
use crate::client::{Client, ClientError};
use crate::middleware::Middleware;

/// Base URL of the hosted Dify service API.
pub const DEFAULT_BASE_URL: &str = "https://api.dify.ai/v1";

/// Environment variable consulted by [`ClientOptions::from_env`].
pub const BASE_URL_ENV: &str = "DIFY_BASE_URL";

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Transport configuration shared by every request of a [`Client`].
///
/// # Example
/// ```rust
/// use difyai::options::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::default()
///     .with_base_url("https://dify.internal.example/v1")
///     .with_header("X-Tenant", "acme")
///     .with_timeout(Duration::from_secs(30));
///
/// assert_eq!(options.base_url, "https://dify.internal.example/v1");
/// ```
#[derive(Clone)]
pub struct ClientOptions {
    /// Base URL every relative request path is appended to.
    pub base_url: String,

    /// Headers sent with every request. Keys are stored lowercase.
    pub headers: BTreeMap<String, String>,

    /// Overall request timeout, applied by the HTTP client.
    pub timeout: Option<Duration>,

    /// Connect timeout, applied by the HTTP client.
    pub connect_timeout: Option<Duration>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Middleware stack, outermost first.
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headers: BTreeMap::new(),
            timeout: None,
            connect_timeout: None,
            proxy: None,
            middleware: Vec::new(),
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("proxy", &self.proxy)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl ClientOptions {
    /// Default options, with the base URL overridden by `DIFY_BASE_URL` when set.
    pub fn from_env() -> Self {
        let options = Self::default();
        match std::env::var(BASE_URL_ENV) {
            Ok(base_url) if !base_url.trim().is_empty() => options.with_base_url(base_url.trim()),
            _ => options,
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Add a single default header. A later value for the same name wins.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.into().trim().to_ascii_lowercase(), value.into());
        self
    }

    /// Merge default headers.
    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        for (key, value) in headers {
            self = self.with_header(key, value);
        }
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Register a middleware. The first registered middleware is the
    /// outermost layer of the onion.
    pub fn with_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Build a transport client authenticated with `api_key`.
    pub fn client(&self, api_key: impl Into<SecretString>) -> Result<Client, ClientError> {
        Client::new(api_key, self.clone())
    }

    /// Build a client for a chat-type app.
    pub fn chat(&self, api_key: impl Into<SecretString>) -> Result<ChatApp, ClientError> {
        Ok(ChatApp::new(self.client(api_key)?))
    }

    /// Build a client for a completion-type app.
    pub fn completion(&self, api_key: impl Into<SecretString>) -> Result<CompletionApp, ClientError> {
        Ok(CompletionApp::new(self.client(api_key)?))
    }
}
