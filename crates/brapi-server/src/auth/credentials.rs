//! Bearer token authentication

use async_trait::async_trait;
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::Caller;
use crate::error::{BrapiError, BrapiResult};

/// Failed attempts allowed per client within [`DEFAULT_THROTTLE_WINDOW_SECS`].
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;

/// Window over which failed attempts are counted.
pub const DEFAULT_THROTTLE_WINDOW_SECS: u64 = 60;

/// Resolves the caller of a request
#[async_trait]
pub trait CredentialService: Send + Sync {
    /// `None` means no token was presented
    async fn authenticate(&self, token: Option<&str>, client: &str) -> BrapiResult<Caller>;
}

/// Keyed GCRA limiter charged once per failed authentication
///
/// Each client may fail `max_failures` times in a burst; the allowance
/// refills at one attempt per `window / max_failures`.
pub struct FailedAttemptThrottle {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl std::fmt::Debug for FailedAttemptThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailedAttemptThrottle")
            .field("clients", &self.limiter.len())
            .finish()
    }
}

impl Default for FailedAttemptThrottle {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_FAILED_ATTEMPTS,
            Duration::from_secs(DEFAULT_THROTTLE_WINDOW_SECS),
        )
    }
}

impl FailedAttemptThrottle {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(max_failures).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_minute(burst))
            .allow_burst(burst);
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Charge one failure to `client`; `TooManyRequests` once its allowance is spent
    pub fn record_failure(&self, client: &str) -> BrapiResult<()> {
        self.limiter.check_key(&client.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            warn!(client = %client, retry_after_secs = wait.as_secs(), "Authentication throttled");
            BrapiError::TooManyRequests(
                "Too many failed authentication attempts, try again later".to_string(),
            )
        })
    }

    /// Drop clients whose allowance has fully refilled
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    /// Clients currently tracked
    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }
}

/// Fixed token table, configured through `BRAPI_TOKENS`
#[derive(Debug, Default)]
pub struct StaticTokenCredentials {
    tokens: BTreeMap<String, Vec<String>>,
    throttle: Arc<FailedAttemptThrottle>,
}

impl StaticTokenCredentials {
    pub fn new(tokens: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            tokens,
            throttle: Arc::new(FailedAttemptThrottle::default()),
        }
    }

    pub fn with_throttle(mut self, throttle: Arc<FailedAttemptThrottle>) -> Self {
        self.throttle = throttle;
        self
    }
}

#[async_trait]
impl CredentialService for StaticTokenCredentials {
    async fn authenticate(&self, token: Option<&str>, client: &str) -> BrapiResult<Caller> {
        let Some(token) = token else {
            return Ok(Caller::anonymous());
        };

        match self.tokens.get(token) {
            Some(roles) => {
                debug!(roles = ?roles, "Authenticated bearer token");
                Ok(Caller::with_roles(roles.iter().cloned()))
            },
            None => {
                self.throttle.record_failure(client)?;
                Err(BrapiError::Unauthorized("Invalid or expired access token".to_string()))
            },
        }
    }
}
