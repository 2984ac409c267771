use std::time::Duration;

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the remote reader needs to know about its resource.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// URL of the remote object
    pub url: String,
    /// Applied to each request separately, not to the whole extraction
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
