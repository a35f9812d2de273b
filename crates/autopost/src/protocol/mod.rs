//! Asynchronous publish protocol.
//!
//! Both the storefront file pipeline and the Instagram media pipeline follow
//! the same shape:
//!
//! ```text
//! REQUESTED -> UPLOADING -> PROCESSING -> READY
//!                                      -> FAILED
//!                                      -> TIMED_OUT
//! ```
//!
//! A target implements the four remote calls in [`AsyncPublishTarget`] and
//! [`PublishProtocol::drive`] runs the state machine: restart from
//! `REQUESTED` when staging or uploading fails (staged targets are
//! single-use), poll at a fixed interval within a bounded budget, and
//! finalize exactly once, only after the remote reported ready.

mod state;

pub use state::{PollStatus, PublishOutcome, PublishState};

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::retry::RetryPolicy;

/// Upper bound for the time a single publish may spend polling.
pub const MAX_POLL_WAIT: Duration = Duration::from_secs(120);

/// A remote API that accepts an asset, processes it asynchronously and then
/// allows a finalize/publish call.
#[async_trait]
pub trait AsyncPublishTarget: Send + Sync {
    /// What the caller wants published.
    type Request: Send + Sync;
    /// Result of the creation call, consumed by `upload`.
    type Staged: Send;
    /// Opaque id of the asset being processed.
    type Handle: Send + Sync + fmt::Display;
    /// Data carried by a ready status.
    type Ready: Send;
    /// Permanent reference handed to downstream components.
    type Output: Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// `REQUESTED`: ask the remote to prepare for the asset.
    async fn request(&self, request: &Self::Request) -> Result<Self::Staged>;

    /// `UPLOADING`: push the asset into the staged slot and obtain the handle.
    /// Targets without an upload step return the handle directly.
    async fn upload(&self, request: &Self::Request, staged: Self::Staged) -> Result<Self::Handle>;

    /// `PROCESSING`: one idempotent status read.
    async fn poll(&self, handle: &Self::Handle) -> Result<PollStatus<Self::Ready>>;

    /// Called once, after `READY`.
    async fn finalize(&self, handle: &Self::Handle, ready: Self::Ready) -> Result<Self::Output>;
}

/// Drives an [`AsyncPublishTarget`] through its states.
#[derive(Debug, Clone, Copy)]
pub struct PublishProtocol {
    /// Budget for restarting from `REQUESTED` after a staging/upload failure.
    pub restart: RetryPolicy,
    /// Budget and interval for status reads.
    pub poll: RetryPolicy,
}

impl Default for PublishProtocol {
    fn default() -> Self {
        Self {
            restart: RetryPolicy::fixed(2, Duration::from_secs(2)),
            poll: RetryPolicy::polling(),
        }
    }
}

impl PublishProtocol {
    /// Create a protocol with the given poll policy, capped to [`MAX_POLL_WAIT`].
    #[must_use]
    pub fn new(restart: RetryPolicy, poll: RetryPolicy) -> Self {
        let capped = poll.capped(MAX_POLL_WAIT);
        if capped != poll {
            warn!(
                requested = poll.max_attempts,
                allowed = capped.max_attempts,
                "Poll budget exceeds the maximum wait, reducing attempts"
            );
        }
        Self {
            restart,
            poll: capped,
        }
    }

    /// Run the full workflow for one asset.
    pub async fn drive<T>(&self, target: &T, request: &T::Request) -> PublishOutcome<T::Output>
    where
        T: AsyncPublishTarget + ?Sized,
    {
        let handle = match self.stage(target, request).await {
            Ok(handle) => handle,
            Err((state, reason)) => return PublishOutcome::Failed { state, reason },
        };

        debug!(service = target.name(), handle = %handle, state = %PublishState::Processing, "Polling for readiness");

        for attempt in 1..=self.poll.max_attempts {
            let wait = self.poll.step();
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            match target.poll(&handle).await {
                Ok(PollStatus::Ready(ready)) => {
                    info!(
                        service = target.name(),
                        handle = %handle,
                        polls = attempt,
                        state = %PublishState::Ready,
                        "Asset ready"
                    );
                    return match target.finalize(&handle, ready).await {
                        Ok(output) => PublishOutcome::Published {
                            output,
                            polls: attempt,
                        },
                        Err(e) => PublishOutcome::Failed {
                            state: PublishState::Ready,
                            reason: format!("finalize failed: {e}"),
                        },
                    };
                }
                Ok(PollStatus::Failed(reason)) => {
                    return PublishOutcome::Failed {
                        state: PublishState::Processing,
                        reason,
                    };
                }
                Ok(PollStatus::Pending(status)) => {
                    debug!(
                        service = target.name(),
                        handle = %handle,
                        status = %status,
                        attempt,
                        max_attempts = self.poll.max_attempts,
                        "Still processing"
                    );
                }
                Err(e) => {
                    warn!(
                        service = target.name(),
                        handle = %handle,
                        attempt,
                        error = %e,
                        "Status read failed, will poll again"
                    );
                }
            }
        }

        PublishOutcome::TimedOut {
            polls: self.poll.max_attempts,
        }
    }

    /// `REQUESTED` + `UPLOADING`, restarting both on any failure.
    async fn stage<T>(
        &self,
        target: &T,
        request: &T::Request,
    ) -> std::result::Result<T::Handle, (PublishState, String)>
    where
        T: AsyncPublishTarget + ?Sized,
    {
        let attempts = self.restart.max_attempts.max(1);
        let mut last_failure = (PublishState::Requested, String::from("not attempted"));

        for attempt in 1..=attempts {
            let wait = self.restart.delay_before(attempt);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            debug!(service = target.name(), attempt, state = %PublishState::Requested, "Requesting");
            let staged = match target.request(request).await {
                Ok(staged) => staged,
                Err(e) => {
                    warn!(service = target.name(), attempt, error = %e, "Creation call failed");
                    last_failure = (PublishState::Requested, e.to_string());
                    continue;
                }
            };

            debug!(service = target.name(), attempt, state = %PublishState::Uploading, "Uploading");
            match target.upload(request, staged).await {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    warn!(
                        service = target.name(),
                        attempt,
                        error = %e,
                        "Upload failed, staged target discarded"
                    );
                    last_failure = (PublishState::Uploading, e.to_string());
                }
            }
        }

        Err(last_failure)
    }
}

/// Drop the query string and fragment from a URL.
///
/// Signed or versioned CDN URLs are rejected by the social networks' media
/// endpoints.
pub fn strip_query(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutopostError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counters {
        requests: AtomicU32,
        uploads: AtomicU32,
        polls: AtomicU32,
        finalizes: AtomicU32,
    }

    struct ScriptedTarget {
        statuses: Mutex<VecDeque<Result<PollStatus<String>>>>,
        failing_uploads: AtomicU32,
        failing_requests: AtomicU32,
        counters: Counters,
    }

    impl ScriptedTarget {
        fn new(statuses: Vec<Result<PollStatus<String>>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                failing_uploads: AtomicU32::new(0),
                failing_requests: AtomicU32::new(0),
                counters: Counters::default(),
            }
        }

        fn pending(n: usize) -> Vec<Result<PollStatus<String>>> {
            (0..n)
                .map(|_| Ok(PollStatus::Pending("PROCESSING".to_string())))
                .collect()
        }
    }

    fn boom(what: &str) -> AutopostError {
        AutopostError::Api {
            service: "scripted",
            status: 500,
            message: what.to_string(),
        }
    }

    #[async_trait]
    impl AsyncPublishTarget for ScriptedTarget {
        type Request = ();
        type Staged = u32;
        type Handle = String;
        type Ready = String;
        type Output = String;

        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn request(&self, _request: &()) -> Result<u32> {
            let n = self.counters.requests.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_requests.load(Ordering::SeqCst) >= n {
                return Err(boom("request"));
            }
            Ok(n)
        }

        async fn upload(&self, _request: &(), staged: u32) -> Result<String> {
            let n = self.counters.uploads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_uploads.load(Ordering::SeqCst) >= n {
                return Err(boom("upload"));
            }
            Ok(format!("handle-{staged}"))
        }

        async fn poll(&self, _handle: &String) -> Result<PollStatus<String>> {
            self.counters.polls.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PollStatus::Pending("IN_PROGRESS".to_string())))
        }

        async fn finalize(&self, handle: &String, ready: String) -> Result<String> {
            self.counters.finalizes.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{handle}:{}", strip_query(&ready)))
        }
    }

    fn protocol(poll_attempts: u32) -> PublishProtocol {
        PublishProtocol::new(RetryPolicy::immediate(2), RetryPolicy::immediate(poll_attempts))
    }

    #[tokio::test]
    async fn test_ready_after_two_pending_reads() {
        let mut statuses = ScriptedTarget::pending(2);
        statuses.push(Ok(PollStatus::Ready(
            "https://cdn.example.com/a.png?v=17".to_string(),
        )));
        let target = ScriptedTarget::new(statuses);

        let outcome = protocol(10).drive(&target, &()).await;

        assert_eq!(target.counters.polls.load(Ordering::SeqCst), 3);
        assert_eq!(target.counters.finalizes.load(Ordering::SeqCst), 1);
        match outcome {
            PublishOutcome::Published { output, polls } => {
                assert_eq!(polls, 3);
                assert_eq!(output, "handle-1:https://cdn.example.com/a.png");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_budget_times_out_without_finalize() {
        let target = ScriptedTarget::new(ScriptedTarget::pending(50));

        let outcome = protocol(10).drive(&target, &()).await;

        assert!(matches!(outcome, PublishOutcome::TimedOut { polls: 10 }));
        assert_eq!(target.counters.polls.load(Ordering::SeqCst), 10);
        assert_eq!(target.counters.finalizes.load(Ordering::SeqCst), 0);
        assert!(outcome.into_option("scripted").is_none());
    }

    #[tokio::test]
    async fn test_remote_failure_stops_polling() {
        let target = ScriptedTarget::new(vec![
            Ok(PollStatus::Pending("IN_PROGRESS".to_string())),
            Ok(PollStatus::Failed("ERROR".to_string())),
        ]);

        let outcome = protocol(10).drive(&target, &()).await;

        assert!(matches!(
            outcome,
            PublishOutcome::Failed {
                state: PublishState::Processing,
                ..
            }
        ));
        assert_eq!(target.counters.polls.load(Ordering::SeqCst), 2);
        assert_eq!(target.counters.finalizes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_restarts_from_request() {
        let target = ScriptedTarget::new(vec![Ok(PollStatus::Ready("u".to_string()))]);
        target.failing_uploads.store(1, Ordering::SeqCst);

        let outcome = protocol(3).drive(&target, &()).await;

        assert_eq!(target.counters.requests.load(Ordering::SeqCst), 2);
        assert_eq!(target.counters.uploads.load(Ordering::SeqCst), 2);
        match outcome {
            // the second staged slot is the one that gets used
            PublishOutcome::Published { output, .. } => assert_eq!(output, "handle-2:u"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_failing_every_time_never_polls() {
        let target = ScriptedTarget::new(vec![]);
        target.failing_uploads.store(u32::MAX, Ordering::SeqCst);

        let outcome = protocol(3).drive(&target, &()).await;

        assert!(matches!(
            outcome,
            PublishOutcome::Failed {
                state: PublishState::Uploading,
                ..
            }
        ));
        assert_eq!(target.counters.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_request_failure_reports_requested_state() {
        let target = ScriptedTarget::new(vec![]);
        target.failing_requests.store(u32::MAX, Ordering::SeqCst);

        let outcome = protocol(3).drive(&target, &()).await;

        assert!(matches!(
            outcome,
            PublishOutcome::Failed {
                state: PublishState::Requested,
                ..
            }
        ));
        assert_eq!(target.counters.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_error_consumes_one_poll() {
        let target = ScriptedTarget::new(vec![
            Err(boom("status read")),
            Ok(PollStatus::Ready("u".to_string())),
        ]);

        let outcome = protocol(2).drive(&target, &()).await;

        assert!(matches!(outcome, PublishOutcome::Published { polls: 2, .. }));
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(
            strip_query("https://cdn.shopify.com/s/files/1/a.png?v=1771415971"),
            "https://cdn.shopify.com/s/files/1/a.png"
        );
        assert_eq!(strip_query("https://x.test/a.png#frag"), "https://x.test/a.png");
        assert_eq!(strip_query("https://x.test/a.png"), "https://x.test/a.png");
    }

    #[test]
    fn test_new_caps_poll_budget() {
        let protocol = PublishProtocol::new(
            RetryPolicy::once(),
            RetryPolicy::fixed(100, Duration::from_secs(5)),
        );
        assert!(protocol.poll.total_wait() <= MAX_POLL_WAIT);
    }
}
