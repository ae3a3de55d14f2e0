//! Bounded polling for an asynchronously delivered message
//!
//! ```text
//! Idle -> Polling -> Matched
//!                 -> TimedOut       (deadline or retry cap reached)
//!                 -> Cancelled      (caller token fired; wins over a match)
//!                 -> ProviderError  (surfaced immediately, never retried)
//! ```
//!
//! Only "not arrived yet" and "arrived but does not match" lead to another
//! poll. The inter-poll sleep and the fetch itself both race the
//! cancellation token, so a cancelled wait returns without finishing the
//! current interval.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::PollPolicy;
use crate::error::{Error, Result};
use crate::provider::ProviderAdapter;
use crate::types::{NotificationMessage, TestIdentity};

/// Caller-supplied predicate deciding which message ends the wait
pub type Matcher<'a> = dyn Fn(&NotificationMessage) -> bool + Send + Sync + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Matched,
    TimedOut,
    Cancelled,
    ProviderError,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Idle | PollState::Polling)
    }

    /// Terminal state a wait error corresponds to
    pub fn from_error(error: &Error) -> PollState {
        match error {
            Error::Timeout { .. } => PollState::TimedOut,
            Error::Cancelled { .. } => PollState::Cancelled,
            _ => PollState::ProviderError,
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollState::Idle => "idle",
            PollState::Polling => "polling",
            PollState::Matched => "matched",
            PollState::TimedOut => "timed_out",
            PollState::Cancelled => "cancelled",
            PollState::ProviderError => "provider_error",
        };
        f.write_str(s)
    }
}

/// A successful wait
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub message: NotificationMessage,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// One wait request
pub struct WaitSpec<'a> {
    pub identity: &'a TestIdentity,
    pub matcher: &'a Matcher<'a>,
    /// Human-readable matcher summary used in errors and logs
    pub description: &'a str,
    /// Ignore messages received before this instant
    pub since: Option<DateTime<Utc>>,
    pub policy: PollPolicy,
}

pub struct NotificationPoller {
    provider: Arc<dyn ProviderAdapter>,
}

impl NotificationPoller {
    pub fn new(provider: Arc<dyn ProviderAdapter>) -> Self {
        Self { provider }
    }

    /// Poll until the matcher accepts a message, the deadline passes, the
    /// retry cap is hit, the token is cancelled or the provider fails
    pub async fn wait_for(&self, spec: WaitSpec<'_>, cancel: &CancellationToken) -> Result<PollOutcome> {
        spec.policy.validate()?;
        let span = info_span!(
            "wait",
            wait_id = %Uuid::new_v4(),
            address = spec.identity.address(),
            matcher = spec.description,
        );
        self.run(spec, cancel).instrument(span).await
    }

    async fn run(&self, spec: WaitSpec<'_>, cancel: &CancellationToken) -> Result<PollOutcome> {
        let WaitSpec {
            identity,
            matcher,
            description,
            since,
            policy,
        } = spec;
        let start = Instant::now();
        let mut attempts: u32 = 0;

        let cancelled = |elapsed: Duration| Error::Cancelled {
            address: identity.address().to_string(),
            matcher: description.to_string(),
            elapsed,
        };

        loop {
            if cancel.is_cancelled() {
                info!(attempts, "wait cancelled");
                return Err(cancelled(start.elapsed()));
            }

            attempts += 1;

            // Bound a slow fetch so the wait never overruns timeout + interval
            let budget = policy
                .timeout
                .saturating_add(policy.interval)
                .saturating_sub(start.elapsed());
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempts, "wait cancelled during fetch");
                    return Err(cancelled(start.elapsed()));
                }
                result = tokio::time::timeout(budget, self.provider.fetch_latest(identity, since)) => {
                    match result {
                        Ok(Ok(message)) => message,
                        Ok(Err(e)) => {
                            warn!(attempts, error = %e, state = %PollState::ProviderError, "provider error, giving up");
                            return Err(e);
                        }
                        Err(_) => {
                            debug!(attempts, "fetch exceeded remaining budget");
                            None
                        }
                    }
                }
            };

            if cancel.is_cancelled() {
                info!(attempts, "wait cancelled");
                return Err(cancelled(start.elapsed()));
            }

            match fetched {
                Some(message) if matcher(&message) => {
                    let elapsed = start.elapsed();
                    info!(attempts, ?elapsed, subject = message.subject(), state = %PollState::Matched, "notification matched");
                    return Ok(PollOutcome {
                        message,
                        attempts,
                        elapsed,
                    });
                }
                Some(message) => {
                    debug!(attempts, subject = message.subject(), "latest message does not match");
                }
                None => {
                    debug!(attempts, "no message yet");
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= policy.timeout || attempts > policy.max_retries {
                warn!(attempts, ?elapsed, state = %PollState::TimedOut, "no matching notification");
                return Err(Error::Timeout {
                    address: identity.address().to_string(),
                    matcher: description.to_string(),
                    elapsed,
                    attempts,
                });
            }

            let pause = policy.interval.min(policy.timeout - elapsed);
            debug!(?pause, state = %PollState::Polling, "sleeping until next poll");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempts, "wait cancelled while sleeping");
                    return Err(cancelled(start.elapsed()));
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
