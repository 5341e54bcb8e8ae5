//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync operations.
///
/// Set once by the host and read by the orchestrator and scheduler.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the sync endpoint (`GET`/`POST {sync_api}/{idUser}/{cursor}`).
    pub sync_api: Option<String>,
    /// Base URL of the user endpoint (`PUT {sync_user_api}/{userId}`).
    pub sync_user_api: Option<String>,
    /// Whether this installation may sync tags and notes at all.
    pub access_tags_notes: bool,
    /// Window used to coalesce bursts of sync requests.
    pub debounce: Duration,
    /// Background renewal backoff.
    pub renewal: RenewalBackoff,
    /// Request timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration for the given endpoints.
    pub fn new(sync_api: impl Into<String>, sync_user_api: impl Into<String>) -> Self {
        Self {
            sync_api: Some(sync_api.into()),
            sync_user_api: Some(sync_user_api.into()),
            ..Self::default()
        }
    }

    /// Enables or disables tags-and-notes access.
    pub fn with_access_tags_notes(mut self, access: bool) -> Self {
        self.access_tags_notes = access;
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the renewal backoff.
    pub fn with_renewal(mut self, renewal: RenewalBackoff) -> Self {
        self.renewal = renewal;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns true if both endpoints are configured and non-empty.
    pub fn has_endpoints(&self) -> bool {
        let set = |url: &Option<String>| url.as_deref().is_some_and(|u| !u.trim().is_empty());
        set(&self.sync_api) && set(&self.sync_user_api)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_api: None,
            sync_user_api: None,
            access_tags_notes: false,
            debounce: Duration::from_millis(500),
            renewal: RenewalBackoff::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Delays between background renewal attempts.
///
/// The last step repeats once the sequence is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalBackoff {
    steps: Vec<Duration>,
}

impl RenewalBackoff {
    /// Creates a backoff from explicit steps.
    ///
    /// An empty list falls back to the default sequence.
    pub fn new(steps: Vec<Duration>) -> Self {
        if steps.is_empty() {
            return Self::default();
        }
        Self { steps }
    }

    /// Returns the delay before the given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let last = self.steps.len().saturating_sub(1);
        self.steps
            .get(attempt.min(last))
            .copied()
            .unwrap_or(Duration::from_secs(120))
    }

    /// Returns the configured steps.
    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }
}

impl Default for RenewalBackoff {
    fn default() -> Self {
        Self {
            steps: vec![
                Duration::from_secs(10),
                Duration::from_secs(60),
                Duration::from_secs(120),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://sync.example.com/sync", "https://sync.example.com/user")
            .with_access_tags_notes(true)
            .with_debounce(Duration::from_millis(50))
            .with_timeout(Duration::from_secs(5));

        assert!(config.has_endpoints());
        assert!(config.access_tags_notes);
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn endpoints_required() {
        assert!(!SyncConfig::default().has_endpoints());

        let mut config = SyncConfig::new("https://a", "  ");
        assert!(!config.has_endpoints());
        config.sync_user_api = Some("https://b".into());
        assert!(config.has_endpoints());
    }

    #[test]
    fn renewal_holds_last_step() {
        let backoff = RenewalBackoff::default();
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(120));
        assert_eq!(backoff.delay_for_attempt(50), Duration::from_secs(120));
    }

    #[test]
    fn empty_backoff_uses_default() {
        assert_eq!(RenewalBackoff::new(Vec::new()), RenewalBackoff::default());
    }
}
