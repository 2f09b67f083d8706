//! Wait - Poll a remote object until it reaches a target status
//!
//! Cloud APIs answer most mutations with "accepted" and finish the work in
//! the background. [`StateChangeConf`] repeatedly refreshes the object at a
//! fixed interval until its status enters the target set.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

/// Status that always terminates a wait with a failure
pub const ERROR_STATUS: &str = "ERROR";

/// One refresh of the polled object
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T> {
    pub value: T,
    pub status: String,
    /// Fault detail reported alongside an `ERROR` status
    pub fault: Option<String>,
}

impl<T> Observation<T> {
    pub fn new(value: T, status: impl Into<String>) -> Self {
        Self {
            value,
            status: status.into(),
            fault: None,
        }
    }

    pub fn with_fault(mut self, fault: impl Into<String>) -> Self {
        self.fault = Some(fault.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {timeout:?})",
        target.join(", ")
    )]
    Timeout {
        last_state: String,
        target: Vec<String>,
        timeout: Duration,
    },

    #[error("unexpected state '{state}', wanted target '{}'", target.join(", "))]
    UnexpectedState { state: String, target: Vec<String> },

    #[error("{state}: {message}")]
    Failed { state: String, message: String },

    #[error("{0}")]
    Refresh(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Parameters of a wait
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    pub poll_interval: Duration,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Refresh until the status is in `target`, returning the last value
    ///
    /// `ERROR` fails immediately with the observed fault. A status outside
    /// both `pending` and `target` fails as unexpected. A refresh error
    /// aborts the wait. A refresh still running at the deadline is dropped
    /// and the wait times out.
    pub async fn wait_for_state<T, E, F, Fut>(&self, mut refresh: F) -> Result<T, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let deadline = Instant::now() + self.timeout;
        debug!("Waiting for state to become: {:?}", self.target);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut last_state = String::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let observation = match tokio::time::timeout(remaining, refresh()).await {
                Ok(result) => result.map_err(|e| WaitError::Refresh(e.into()))?,
                Err(_) => return Err(self.timed_out(last_state)),
            };
            let status = observation.status;

            if status == ERROR_STATUS {
                return Err(WaitError::Failed {
                    message: observation
                        .fault
                        .unwrap_or_else(|| "remote object entered an error state".to_string()),
                    state: status,
                });
            }
            if self.target.contains(&status) {
                return Ok(observation.value);
            }
            if !self.pending.contains(&status) {
                return Err(WaitError::UnexpectedState {
                    state: status,
                    target: self.target.clone(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(status));
            }
            debug!("Current state '{}', still waiting", status);
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
            last_state = status;
        }
    }

    fn timed_out(&self, last_state: String) -> WaitError {
        WaitError::Timeout {
            last_state,
            target: self.target.clone(),
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn conf() -> StateChangeConf {
        StateChangeConf::new(&["BUILD"], &["ACTIVE"], Duration::from_secs(60))
    }

    /// Refresh that replays `statuses`, repeating the last one
    fn replay<'a>(
        statuses: &'a [&'a str],
        calls: &'a Cell<usize>,
    ) -> impl FnMut() -> std::future::Ready<Result<Observation<usize>, std::io::Error>> + 'a {
        move || {
            let n = calls.get();
            calls.set(n + 1);
            let status = statuses[n.min(statuses.len() - 1)];
            std::future::ready(Ok(Observation::new(n, status)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let value = conf()
            .wait_for_state(replay(&["BUILD", "BUILD", "ACTIVE"], &calls))
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.get(), 3);
        // 5s delay + two 5s intervals
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn error_status_carries_fault() {
        let mut first = true;
        let err = conf()
            .wait_for_state(|| {
                let status = if first { "BUILD" } else { "ERROR" };
                first = false;
                std::future::ready(Ok::<_, std::io::Error>(
                    Observation::new((), status).with_fault("error code: 500, message: no host"),
                ))
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "ERROR: error code: 500, message: no host");
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state_fails() {
        let calls = Cell::new(0);
        let err = conf()
            .wait_for_state(replay(&["SHUTOFF"], &calls))
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::UnexpectedState { ref state, .. } if state == "SHUTOFF"));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_state() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let err = StateChangeConf::new(&["BUILD"], &["ACTIVE"], Duration::from_secs(12))
            .with_delay(Duration::ZERO)
            .wait_for_state(replay(&["BUILD"], &calls))
            .await
            .unwrap_err();

        match err {
            WaitError::Timeout { last_state, .. } => assert_eq!(last_state, "BUILD"),
            other => panic!("Expected Timeout, got {:?}", other),
        }
        // Refreshed at 0s, 5s, 10s and 12s
        assert_eq!(calls.get(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_refresh_times_out() {
        let start = Instant::now();
        let err = StateChangeConf::new(&["BUILD"], &["ACTIVE"], Duration::from_secs(10))
            .wait_for_state(std::future::pending::<Result<Observation<()>, std::io::Error>>)
            .await
            .unwrap_err();

        match err {
            WaitError::Timeout { last_state, .. } => assert_eq!(last_state, ""),
            other => panic!("Expected Timeout, got {:?}", other),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_hanging_after_progress_keeps_last_state() {
        let mut first = true;
        let err = StateChangeConf::new(&["BUILD"], &["ACTIVE"], Duration::from_secs(30))
            .with_delay(Duration::ZERO)
            .wait_for_state(|| {
                let answer = first;
                first = false;
                async move {
                    if !answer {
                        std::future::pending::<()>().await;
                    }
                    Ok::<_, std::io::Error>(Observation::new((), "BUILD"))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Timeout { ref last_state, .. } if last_state == "BUILD"));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_error_aborts() {
        let err = conf()
            .wait_for_state(|| {
                std::future::ready(Err::<Observation<()>, _>(std::io::Error::other("boom")))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Refresh(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
