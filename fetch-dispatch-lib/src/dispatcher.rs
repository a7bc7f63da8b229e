//! Bounded worker pool.
//!
//! This module provides the [`Dispatcher`], which retrieves an ordered list
//! of resources with at most `concurrency` requests in flight and returns one
//! [`Outcome`] per input, at the input's index.
//!
//! Each dispatch builds a fresh [`WorkQueue`] and [`OutcomeSlots`], spawns
//! the workers into a `JoinSet`, and waits for every worker to drain the
//! queue before collecting the slots.

use crate::error::{DispatchError, FetchError};
use crate::fetcher::Fetch;
use crate::queue::WorkQueue;
use crate::slots::OutcomeSlots;
use crate::types::{DispatchConfig, Outcome};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(feature = "http")]
use crate::fetcher::HttpFetcher;

/// Runs retrievals through a shared [`Fetch`] implementation.
///
/// # Example
///
/// ```rust,no_run
/// use fetch_dispatch_lib::Dispatcher;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dispatcher = Dispatcher::new()?;
///     let urls = vec![
///         "https://httpbin.org/json".to_string(),
///         "https://httpbin.org/status/404".to_string(),
///     ];
///
///     let outcomes = dispatcher.dispatch(&urls, 5).await?;
///     for (url, outcome) in urls.iter().zip(&outcomes) {
///         println!("{}: success={}", url, outcome.is_success());
///     }
///     Ok(())
/// }
/// ```
pub struct Dispatcher<F> {
    /// Retrieval collaborator shared by every worker
    fetcher: Arc<F>,
    /// Settings for this dispatcher instance
    config: DispatchConfig,
}

#[cfg(feature = "http")]
impl Dispatcher<HttpFetcher> {
    /// Create an HTTP dispatcher with default configuration.
    pub fn new() -> Result<Self, DispatchError> {
        Self::http(DispatchConfig::default())
    }

    /// Create an HTTP dispatcher; the fetcher picks up the request timeout
    /// and User-Agent from `config`.
    pub fn http(config: DispatchConfig) -> Result<Self, DispatchError> {
        let fetcher = HttpFetcher::with_config(&config)?;
        Ok(Self::with_fetcher_and_config(fetcher, config))
    }
}

impl<F> Dispatcher<F>
where
    F: Fetch + 'static,
{
    /// Create a dispatcher around a custom fetcher.
    pub fn with_fetcher(fetcher: F) -> Self {
        Self::with_fetcher_and_config(fetcher, DispatchConfig::default())
    }

    pub fn with_fetcher_and_config(fetcher: F, config: DispatchConfig) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Retrieve every resource using at most `concurrency` workers.
    ///
    /// The returned vector has the same length as `resources` and
    /// `outcomes[i]` always belongs to `resources[i]`. Failures of individual
    /// retrievals are recorded as [`Outcome::Failure`] and never abort the
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConcurrency`] if `concurrency` is zero.
    /// In that case no worker is spawned and nothing is fetched.
    pub async fn dispatch<S: AsRef<str>>(
        &self,
        resources: &[S],
        concurrency: usize,
    ) -> Result<Vec<Outcome<F::Payload>>, DispatchError> {
        self.dispatch_with_cancel(resources, concurrency, CancellationToken::new())
            .await
    }

    /// Dispatch with the worker count from [`DispatchConfig::concurrency`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConcurrency`] if the configured value
    /// is zero.
    pub async fn dispatch_configured<S: AsRef<str>>(
        &self,
        resources: &[S],
        cancel: CancellationToken,
    ) -> Result<Vec<Outcome<F::Payload>>, DispatchError> {
        self.dispatch_with_cancel(resources, self.config.concurrency, cancel)
            .await
    }

    /// Like [`dispatch`](Self::dispatch), but stops claiming new items once
    /// `cancel` fires (or the configured deadline passes).
    ///
    /// Retrievals already in flight run to completion. Items that were never
    /// claimed are recorded as [`FetchError::Cancelled`] failures, so the
    /// result still has one outcome per input.
    pub async fn dispatch_with_cancel<S: AsRef<str>>(
        &self,
        resources: &[S],
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<Outcome<F::Payload>>, DispatchError> {
        if concurrency == 0 {
            return Err(DispatchError::InvalidConcurrency { concurrency });
        }

        if resources.is_empty() {
            return Ok(Vec::new());
        }

        let queue = Arc::new(WorkQueue::new(resources.iter().map(|r| r.as_ref())));
        let slots = Arc::new(OutcomeSlots::new(queue.len()));
        // Workers beyond the item count would find the queue empty immediately
        let workers = concurrency.min(queue.len());

        let cancel = cancel.child_token();
        // Owned by this call so dropping the dispatch future also stops it
        let mut deadline_timer = JoinSet::new();
        if let Some(deadline) = self.config.deadline {
            let cancel = cancel.clone();
            deadline_timer.spawn(async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            });
        }

        info!(items = queue.len(), workers, "Starting dispatch");

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(run_worker(
                worker_id,
                Arc::clone(&self.fetcher),
                Arc::clone(&queue),
                Arc::clone(&slots),
                cancel.clone(),
            ));
        }

        let mut first_error = None;
        while let Some(joined) = pool.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(DispatchError::internal(format!("worker task failed: {}", e)))
            });
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        deadline_timer.abort_all();

        if let Some(e) = first_error {
            return Err(e);
        }

        let slots = Arc::try_unwrap(slots).map_err(|_| {
            DispatchError::internal("outcome slots still shared after all workers exited")
        })?;

        if cancel.is_cancelled() {
            let skipped = slots.fill_unset(|_| Outcome::from_result(Err(FetchError::Cancelled)));
            if skipped > 0 {
                warn!(skipped, "Dispatch cancelled before every item was claimed");
            }
        }

        info!(items = slots.len(), "Dispatch finished");
        slots.into_outcomes()
    }
}

/// Retrieve resources with a one-off dispatcher around `fetcher`.
pub async fn dispatch<F, S>(
    fetcher: F,
    resources: &[S],
    concurrency: usize,
) -> Result<Vec<Outcome<F::Payload>>, DispatchError>
where
    F: Fetch + 'static,
    S: AsRef<str>,
{
    Dispatcher::with_fetcher(fetcher)
        .dispatch(resources, concurrency)
        .await
}

/// Claim-fetch-record loop of a single worker.
///
/// Returns once the queue is drained or cancellation is observed. The only
/// error it can return is a slot invariant breach.
async fn run_worker<F: Fetch>(
    worker_id: usize,
    fetcher: Arc<F>,
    queue: Arc<WorkQueue>,
    slots: Arc<OutcomeSlots<F::Payload>>,
    cancel: CancellationToken,
) -> Result<(), DispatchError> {
    loop {
        if cancel.is_cancelled() {
            debug!(worker_id, "Cancellation observed, worker stopping");
            break;
        }

        let Some(item) = queue.claim() else {
            break;
        };

        debug!(worker_id, index = item.index, resource = %item.resource, "Claimed item");
        let started = Instant::now();

        let result = AssertUnwindSafe(fetcher.fetch(&item.resource))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                warn!(worker_id, index = item.index, %message, "Fetch panicked");
                Err(FetchError::Panicked { message })
            });

        let outcome = Outcome::from_result(result);
        debug!(
            worker_id,
            index = item.index,
            success = outcome.is_success(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished item"
        );

        slots.set(item.index, outcome)?;
    }

    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every call and the peak number of concurrent fetches.
    ///
    /// Resources listed in `failing` return a 500; `"boom"` panics. Each
    /// fetch sleeps `delay_for(resource)` so completion order differs from
    /// input order.
    #[derive(Default)]
    struct SpyFetcher {
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        failing: Vec<String>,
        delays: HashMap<String, Duration>,
    }

    impl SpyFetcher {
        fn failing(resources: &[&str]) -> Self {
            Self {
                failing: resources.iter().map(|r| r.to_string()).collect(),
                ..Default::default()
            }
        }

        fn with_delays(mut self, delays: &[(&str, u64)]) -> Self {
            self.delays = delays
                .iter()
                .map(|(r, ms)| (r.to_string(), Duration::from_millis(*ms)))
                .collect();
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Fetch for SpyFetcher {
        type Payload = String;

        async fn fetch(&self, resource: &str) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push(resource.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = self
                .delays
                .get(resource)
                .copied()
                .unwrap_or(Duration::from_millis(2));
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if resource == "boom" {
                panic!("fetcher exploded on {}", resource);
            }
            if self.failing.iter().any(|f| f == resource) {
                return Err(FetchError::Status { code: 500 });
            }
            Ok(format!("payload:{}", resource))
        }
    }

    fn resources(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("r{}", i)).collect()
    }

    #[tokio::test]
    async fn test_output_is_index_aligned_for_many_shapes() {
        for n in [0usize, 1, 7, 20] {
            for k in [1usize, 3, 50] {
                let input = resources(n);
                let outcomes = dispatch(SpyFetcher::default(), &input, k).await.unwrap();

                assert_eq!(outcomes.len(), n, "n={} k={}", n, k);
                for (i, outcome) in outcomes.iter().enumerate() {
                    assert_eq!(outcome.value(), Some(&format!("payload:r{}", i)));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_completion_order_does_not_affect_positions() {
        // Earlier items take longer, so they finish last.
        let fetcher = SpyFetcher::default().with_delays(&[
            ("r0", 40),
            ("r1", 30),
            ("r2", 20),
            ("r3", 10),
            ("r4", 1),
        ]);
        let outcomes = dispatch(fetcher, &resources(5), 5).await.unwrap();
        let values: Vec<_> = outcomes.iter().map(|o| o.value().unwrap().as_str()).collect();
        assert_eq!(
            values,
            ["payload:r0", "payload:r1", "payload:r2", "payload:r3", "payload:r4"]
        );
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        for k in [1usize, 2, 5, 10] {
            let outcomes = dispatch(SpyFetcher::failing(&["r3"]), &resources(5), k)
                .await
                .unwrap();

            assert_eq!(outcomes.len(), 5);
            for (i, outcome) in outcomes.iter().enumerate() {
                if i == 3 {
                    assert_eq!(outcome.reason(), Some("HTTP error! status: 500"), "k={}", k);
                } else {
                    assert!(outcome.is_success(), "index {} with k={}", i, k);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected_without_fetching() {
        let dispatcher = Dispatcher::with_fetcher(SpyFetcher::default());
        let err = dispatcher.dispatch(&resources(4), 0).await.unwrap_err();

        assert_eq!(err, DispatchError::InvalidConcurrency { concurrency: 0 });
        assert_eq!(dispatcher.fetcher().call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_configured_concurrency_is_rejected_without_fetching() {
        let config = DispatchConfig::default().with_concurrency(0);
        let dispatcher = Dispatcher::with_fetcher_and_config(SpyFetcher::default(), config);

        let err = dispatcher
            .dispatch_configured(&resources(3), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, DispatchError::InvalidConcurrency { concurrency: 0 });
        assert_eq!(dispatcher.fetcher().call_count(), 0);
    }

    #[tokio::test]
    async fn test_configured_concurrency_bounds_in_flight() {
        let config = DispatchConfig::default().with_concurrency(1);
        let dispatcher = Dispatcher::with_fetcher_and_config(SpyFetcher::default(), config);

        let outcomes = dispatcher
            .dispatch_configured(&resources(5), CancellationToken::new())
            .await
            .unwrap();

        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(dispatcher.fetcher().peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_input_returns_immediately() {
        let dispatcher = Dispatcher::with_fetcher(SpyFetcher::default());
        let outcomes = dispatcher.dispatch(&Vec::<String>::new(), 4).await.unwrap();

        assert!(outcomes.is_empty());
        assert_eq!(dispatcher.fetcher().call_count(), 0);
        assert_eq!(dispatcher.fetcher().peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrency_one_is_sequential() {
        let dispatcher = Dispatcher::with_fetcher(SpyFetcher::default());
        let input = resources(6);
        let outcomes = dispatcher.dispatch(&input, 1).await.unwrap();

        assert_eq!(outcomes.len(), 6);
        assert_eq!(dispatcher.fetcher().peak.load(Ordering::SeqCst), 1);
        assert_eq!(*dispatcher.fetcher().calls.lock().unwrap(), input);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_limit() {
        let delays: Vec<(String, u64)> = (0..24).map(|i| (format!("r{}", i), 15)).collect();
        let delay_refs: Vec<(&str, u64)> = delays.iter().map(|(r, d)| (r.as_str(), *d)).collect();

        let dispatcher = Dispatcher::with_fetcher(SpyFetcher::default().with_delays(&delay_refs));
        let outcomes = dispatcher.dispatch(&resources(24), 3).await.unwrap();

        assert_eq!(outcomes.len(), 24);
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(dispatcher.fetcher().peak.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.fetcher().call_count(), 24);
    }

    #[tokio::test]
    async fn test_excess_workers_match_item_count() {
        let input = resources(3);
        let at_n = dispatch(SpyFetcher::failing(&["r1"]), &input, 3).await.unwrap();

        let dispatcher = Dispatcher::with_fetcher(SpyFetcher::failing(&["r1"]));
        let above_n = dispatcher.dispatch(&input, 100).await.unwrap();

        assert_eq!(at_n, above_n);
        assert_eq!(dispatcher.fetcher().call_count(), 3);
    }

    #[tokio::test]
    async fn test_concurrency_does_not_change_outcomes() {
        let input = resources(12);
        let baseline = dispatch(SpyFetcher::failing(&["r2", "r7"]), &input, 1)
            .await
            .unwrap();

        for k in [2usize, 4, 12, 40] {
            let outcomes = dispatch(SpyFetcher::failing(&["r2", "r7"]), &input, k)
                .await
                .unwrap();
            assert_eq!(outcomes, baseline, "k={}", k);
        }
    }

    #[tokio::test]
    async fn test_duplicate_resources_are_fetched_independently() {
        /// Fails the first request for each resource, succeeds afterwards.
        #[derive(Default)]
        struct FlakyOnce {
            seen: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl Fetch for FlakyOnce {
            type Payload = String;

            async fn fetch(&self, resource: &str) -> Result<String, FetchError> {
                let mut seen = self.seen.lock().unwrap();
                let first = !seen.iter().any(|s| s == resource);
                seen.push(resource.to_string());
                if first && resource == "a" {
                    Err(FetchError::network("connection reset"))
                } else {
                    Ok(resource.to_uppercase())
                }
            }
        }

        let dispatcher = Dispatcher::with_fetcher(FlakyOnce::default());
        let outcomes = dispatcher.dispatch(&["a", "a", "b"], 1).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0].reason(),
            Some("Network error: connection reset")
        );
        assert_eq!(outcomes[1].value().map(String::as_str), Some("A"));
        assert_eq!(outcomes[2].value().map(String::as_str), Some("B"));
        assert_eq!(dispatcher.fetcher().seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_panicking_fetch_only_fails_its_item() {
        let input = ["r0", "boom", "r2"];
        let outcomes = dispatch(SpyFetcher::default(), &input, 2).await.unwrap();

        assert!(outcomes[0].is_success());
        assert!(outcomes[2].is_success());
        let reason = outcomes[1].reason().unwrap();
        assert!(reason.contains("Fetch panicked"), "{}", reason);
        assert!(reason.contains("fetcher exploded on boom"), "{}", reason);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_fetches_nothing() {
        let dispatcher = Dispatcher::with_fetcher(SpyFetcher::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = dispatcher
            .dispatch_with_cancel(&resources(4), 2, cancel)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 4);
        assert_eq!(dispatcher.fetcher().call_count(), 0);
        for outcome in &outcomes {
            assert_eq!(outcome.reason(), Some("Cancelled before the request was issued"));
        }
    }

    #[tokio::test]
    async fn test_deadline_stops_new_claims_but_fills_every_slot() {
        let delays: Vec<(String, u64)> = (0..10).map(|i| (format!("r{}", i), 20)).collect();
        let delay_refs: Vec<(&str, u64)> = delays.iter().map(|(r, d)| (r.as_str(), *d)).collect();

        let config = DispatchConfig::default().with_deadline(Duration::from_millis(50));
        let dispatcher = Dispatcher::with_fetcher_and_config(
            SpyFetcher::default().with_delays(&delay_refs),
            config,
        );
        let outcomes = dispatcher.dispatch(&resources(10), 1).await.unwrap();

        assert_eq!(outcomes.len(), 10);
        assert!(outcomes[0].is_success());
        assert_eq!(
            outcomes[9].reason(),
            Some("Cancelled before the request was issued")
        );

        let fetched = dispatcher.fetcher().call_count();
        assert!(fetched < 10);
        // Everything that was claimed ran to completion.
        assert!(outcomes[..fetched].iter().all(|o| o.is_success()));
        assert!(outcomes[fetched..].iter().all(|o| o.is_failure()));
    }

    #[tokio::test]
    async fn test_dropped_dispatch_leaves_no_deadline_timer() {
        let config = DispatchConfig::default().with_deadline(Duration::from_secs(3600));
        let dispatcher = Dispatcher::with_fetcher_and_config(
            SpyFetcher::default().with_delays(&[("r0", 10_000)]),
            config,
        );

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), dispatcher.dispatch(&resources(1), 1))
                .await;
        assert!(abandoned.is_err(), "dispatch should still be waiting on r0");

        let metrics = tokio::runtime::Handle::current().metrics();
        for _ in 0..100 {
            if metrics.num_alive_tasks() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(metrics.num_alive_tasks(), 0);
    }
}
