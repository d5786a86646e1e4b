//! Orchestrator configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::correlation::CorrelationKeyFormat;
use crate::executor::NotApplicablePolicy;

/// What to tell the transport about events the machine does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnhandledEventPolicy {
    /// Log and acknowledge; the event is dropped.
    #[default]
    Ack,

    /// Reject without redelivery.
    Nack,
}

impl FromStr for UnhandledEventPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ack" => Ok(Self::Ack),
            "nack" => Ok(Self::Nack),
            other => Err(format!("unknown unhandled event policy '{other}'")),
        }
    }
}

/// Orchestrator configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SAGA_MAX_ATTEMPTS`: attempts per event before giving up (default: `5`)
/// - `SAGA_RETRY_BACKOFF_MS`: pause before retrying a store outage (default: `10`)
/// - `SAGA_UNHANDLED_EVENT_POLICY`: `ack` or `nack` (default: `ack`)
/// - `SAGA_NOT_APPLICABLE_POLICY`: `ignore` or `reject` (default: `ignore`)
/// - `SAGA_CORRELATION_KEY_FORMAT`: `uuid` or `name` (default: `uuid`)
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub unhandled_event_policy: UnhandledEventPolicy,
    pub not_applicable_policy: NotApplicablePolicy,
    pub correlation_key_format: CorrelationKeyFormat,
}

impl OrchestratorConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_parse("SAGA_MAX_ATTEMPTS")
                .unwrap_or(defaults.max_attempts)
                .max(1),
            retry_backoff: env_parse("SAGA_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            unhandled_event_policy: env_parse("SAGA_UNHANDLED_EVENT_POLICY")
                .unwrap_or(defaults.unhandled_event_policy),
            not_applicable_policy: env_parse("SAGA_NOT_APPLICABLE_POLICY")
                .unwrap_or(defaults.not_applicable_policy),
            correlation_key_format: env_parse("SAGA_CORRELATION_KEY_FORMAT")
                .unwrap_or(defaults.correlation_key_format),
        }
    }

    /// Sets the attempt bound (at least one attempt is always made).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the backoff before retrying a store outage.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the unhandled event policy.
    pub fn with_unhandled_event_policy(mut self, policy: UnhandledEventPolicy) -> Self {
        self.unhandled_event_policy = policy;
        self
    }

    /// Sets the not-applicable event policy.
    pub fn with_not_applicable_policy(mut self, policy: NotApplicablePolicy) -> Self {
        self.not_applicable_policy = policy;
        self
    }

    /// Sets the correlation key format.
    pub fn with_correlation_key_format(mut self, format: CorrelationKeyFormat) -> Self {
        self.correlation_key_format = format;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff: Duration::from_millis(10),
            unhandled_event_policy: UnhandledEventPolicy::Ack,
            not_applicable_policy: NotApplicablePolicy::Ignore,
            correlation_key_format: CorrelationKeyFormat::Uuid,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
