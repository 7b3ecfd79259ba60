//! End-to-end engine tests against in-memory fakes.
//!
//! The store, generator, and artifact storage are all faked here, so
//! these tests exercise the real fan-out, rate limiting, retry, and
//! aggregation logic without Postgres or a network.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use async_trait::async_trait;
use atelier_core::aggregate::JobAggregate;
use atelier_core::credential::{self, CredentialKey, SealedCredential};
use atelier_core::job::{Job, JobItem, JobStatus, JobSubmission, NewItem};
use atelier_core::ports::{
    ArtifactStore, GeneratedImage, GenerationError, GenerationRequest, Generator, JobStore,
    StorageError, StoreError,
};
use atelier_core::ratelimit::{RateLimitConfig, RateLimiter};
use atelier_core::retry::RetryPolicy;
use atelier_core::subtask::{ErrorKind, SubTaskOutcome, SubTaskResult, SubTaskStatus};
use atelier_core::types::DbId;
use atelier_engine::progress::{job_progress, submit_job};
use atelier_engine::{CancelRegistry, EventBus, JobEvent, SubTaskExecutor, Worker};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

const DEFAULT_COST: f64 = 0.01;

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemStore {
    jobs: Mutex<HashMap<DbId, Job>>,
    items: Mutex<HashMap<DbId, Vec<JobItem>>>,
    credentials: Mutex<HashMap<DbId, Vec<u8>>>,
    results: Mutex<BTreeMap<(DbId, i32), SubTaskResult>>,
    next_id: AtomicI64,
}

impl MemStore {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Simulate queue redelivery of an already-processed job.
    fn force_status(&self, job_id: DbId, status: JobStatus) {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).unwrap();
        job.status = status;
    }
}

#[async_trait]
impl JobStore for MemStore {
    async fn enqueue(&self, submission: JobSubmission) -> Result<DbId, StoreError> {
        let job_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let total = submission.items.len() as u32;

        self.jobs.lock().unwrap().insert(
            job_id,
            Job {
                id: job_id,
                capability: submission.capability,
                status: JobStatus::Pending,
                aggregate: JobAggregate {
                    total,
                    ..JobAggregate::default()
                },
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
            },
        );
        self.items.lock().unwrap().insert(
            job_id,
            submission
                .items
                .into_iter()
                .enumerate()
                .map(|(i, item)| JobItem {
                    job_id,
                    item_index: i as i32,
                    prompt: item.prompt,
                    reference_assets: item.reference_assets,
                    aspect_ratio: item.aspect_ratio,
                })
                .collect(),
        );
        self.credentials
            .lock()
            .unwrap()
            .insert(job_id, submission.credential.as_bytes().to_vec());
        Ok(job_id)
    }

    async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job_id) = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.id)
            .min()
        else {
            return Ok(None);
        };
        let job = jobs.get_mut(&job_id).unwrap();
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn load_items(&self, job_id: DbId) -> Result<Vec<JobItem>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_credential(&self, job_id: DbId) -> Result<SealedCredential, StoreError> {
        self.credentials
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .map(SealedCredential::from_bytes)
            .ok_or(StoreError::JobNotFound(job_id))
    }

    async fn create_subtask(&self, job_id: DbId, item_index: i32) -> Result<(), StoreError> {
        self.results
            .lock()
            .unwrap()
            .entry((job_id, item_index))
            .or_insert(SubTaskResult {
                job_id,
                item_index,
                status: SubTaskStatus::Processing,
                output_ref: None,
                error_kind: None,
                error_message: None,
                cost: 0.0,
                processing_time_ms: 0,
            });
        Ok(())
    }

    async fn finalize_subtask(&self, outcome: &SubTaskOutcome) -> Result<bool, StoreError> {
        let mut results = self.results.lock().unwrap();
        match results.get_mut(&(outcome.job_id, outcome.item_index)) {
            Some(row) if row.status == SubTaskStatus::Processing => {
                row.status = outcome.status;
                row.output_ref = outcome.output_ref.clone();
                row.error_kind = outcome.error_kind;
                row.error_message = outcome.error_message.clone();
                row.cost = outcome.cost;
                row.processing_time_ms = outcome.processing_time_ms;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_aggregate(
        &self,
        job_id: DbId,
        aggregate: &JobAggregate,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&job_id) {
            job.aggregate.succeeded = aggregate.succeeded;
            job.aggregate.failed = aggregate.failed;
            job.aggregate.cost = aggregate.cost;
            job.aggregate.duration_ms = aggregate.duration_ms;
        }
        Ok(())
    }

    async fn finalize_job(
        &self,
        job_id: DbId,
        status: JobStatus,
        aggregate: &JobAggregate,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(StoreError::JobNotFound(job_id))?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        job.status = status;
        job.completed_at = Some(Utc::now());
        job.aggregate.succeeded = aggregate.succeeded;
        job.aggregate.failed = aggregate.failed;
        job.aggregate.cost = aggregate.cost;
        job.aggregate.duration_ms = aggregate.duration_ms;
        Ok(true)
    }

    async fn list_results(&self, job_id: DbId) -> Result<Vec<SubTaskResult>, StoreError> {
        Ok(self
            .results
            .lock()
            .unwrap()
            .range((job_id, 0)..=(job_id, i32::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn get_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Fake generator and artifact storage
// ---------------------------------------------------------------------------

/// One scripted response for a prompt. Prompts without a script (or
/// with an exhausted script) succeed at [`DEFAULT_COST`].
enum Step {
    Succeed { cost: f64 },
    Fail(GenerationError),
    /// Block until the semaphore yields a permit, then succeed.
    WaitFor(Arc<Semaphore>),
    /// Sleep, then succeed.
    Delay(Duration),
}

#[derive(Default)]
struct FakeGenerator {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: AtomicU32,
}

impl FakeGenerator {
    fn script(&self, prompt: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(prompt.to_string(), steps.into());
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        _api_key: &str,
    ) -> Result<GeneratedImage, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(&request.prompt).and_then(VecDeque::pop_front)
        };
        let image = |cost| GeneratedImage {
            bytes: vec![0xAB; 16],
            mime_type: "image/png".into(),
            cost,
        };
        match step {
            None => Ok(image(DEFAULT_COST)),
            Some(Step::Succeed { cost }) => Ok(image(cost)),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::WaitFor(gate)) => {
                let _permit = gate.acquire().await;
                Ok(image(DEFAULT_COST))
            }
            Some(Step::Delay(d)) => {
                tokio::time::sleep(d).await;
                Ok(image(DEFAULT_COST))
            }
        }
    }
}

#[derive(Default)]
struct MemArtifacts {
    stored: AtomicU64,
}

#[async_trait]
impl ArtifactStore for MemArtifacts {
    async fn store(&self, _bytes: &[u8], _mime_type: &str) -> Result<String, StorageError> {
        let n = self.stored.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mem://artifacts/{n}"))
    }
}

struct BrokenArtifacts;

#[async_trait]
impl ArtifactStore for BrokenArtifacts {
    async fn store(&self, _bytes: &[u8], _mime_type: &str) -> Result<String, StorageError> {
        Err(StorageError("disk full".into()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemStore>,
    generator: Arc<FakeGenerator>,
    events: Arc<EventBus>,
    cancels: Arc<CancelRegistry>,
    worker: Arc<Worker>,
    key: CredentialKey,
}

impl Harness {
    fn builder() -> HarnessBuilder {
        HarnessBuilder {
            prompt_concurrency: 3,
            limits: vec![("standard".to_string(), 100, Duration::from_secs(60))],
            broken_artifacts: false,
        }
    }

    fn submission(&self, capability: &str, prompts: &[&str]) -> JobSubmission {
        JobSubmission {
            capability: capability.to_string(),
            items: prompts
                .iter()
                .map(|p| NewItem {
                    prompt: p.to_string(),
                    reference_assets: vec![],
                    aspect_ratio: None,
                })
                .collect(),
            credential: credential::seal(&self.key, "sk-agency-test").unwrap(),
        }
    }

    async fn submit(&self, capability: &str, prompts: &[&str]) -> DbId {
        submit_job(self.store.as_ref(), self.submission(capability, prompts))
            .await
            .unwrap()
    }

    /// Claim the next job and run it to its terminal state.
    async fn run_next(&self) -> Job {
        let job = self.store.claim_next().await.unwrap().unwrap();
        let job_id = job.id;
        self.worker
            .run_job(job, &CancellationToken::new())
            .await
            .unwrap();
        self.store.get_job(job_id).await.unwrap().unwrap()
    }

    async fn results(&self, job_id: DbId) -> Vec<SubTaskResult> {
        self.store.list_results(job_id).await.unwrap()
    }
}

struct HarnessBuilder {
    prompt_concurrency: usize,
    limits: Vec<(String, u32, Duration)>,
    broken_artifacts: bool,
}

impl HarnessBuilder {
    fn prompt_concurrency(mut self, n: usize) -> Self {
        self.prompt_concurrency = n;
        self
    }

    fn rate_limit(mut self, capability: &str, limit: u32, window: Duration) -> Self {
        self.limits = vec![(capability.to_string(), limit, window)];
        self
    }

    fn broken_artifacts(mut self) -> Self {
        self.broken_artifacts = true;
        self
    }

    fn build(self) -> Harness {
        let store = Arc::new(MemStore::new());
        let generator = Arc::new(FakeGenerator::default());
        let events = Arc::new(EventBus::default());
        let cancels = Arc::new(CancelRegistry::new());
        let key = CredentialKey::from_passphrase("test-passphrase");

        let limiter = Arc::new(RateLimiter::new(
            self.limits
                .into_iter()
                .map(|(name, limit, window)| (name, RateLimitConfig { limit, window }))
                .collect(),
        ));
        let retry = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
            jitter: 0.0,
        };
        let artifacts: Arc<dyn ArtifactStore> = if self.broken_artifacts {
            Arc::new(BrokenArtifacts)
        } else {
            Arc::new(MemArtifacts::default())
        };
        let executor = Arc::new(SubTaskExecutor::new(
            generator.clone(),
            artifacts,
            limiter,
            retry,
            key.clone(),
        ));
        let worker = Arc::new(Worker::new(
            store.clone(),
            executor,
            events.clone(),
            cancels.clone(),
            self.prompt_concurrency,
        ));

        Harness {
            store,
            generator,
            events,
            cancels,
            worker,
            key,
        }
    }
}

/// Poll `condition` until it holds or the deadline expires.
async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn all_items_succeed() {
    let h = Harness::builder().build();
    let job_id = h.submit("standard", &["a", "b", "c"]).await;

    let job = h.run_next().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.aggregate.succeeded, 3);
    assert_eq!(job.aggregate.failed, 0);
    assert_eq!(job.aggregate.total, 3);
    assert!((job.aggregate.cost - 3.0 * DEFAULT_COST).abs() < 1e-9);
    assert!(job.completed_at.is_some());

    for result in h.results(job_id).await {
        assert_eq!(result.status, SubTaskStatus::Completed);
        assert!(result.output_ref.is_some());
    }
}

#[tokio::test]
async fn zero_item_job_completes_immediately() {
    let h = Harness::builder().build();
    let job_id = h.submit("standard", &[]).await;

    let job = h.run_next().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.aggregate, JobAggregate::empty());
    assert!(job.completed_at.is_some());
    assert!(h.results(job_id).await.is_empty());
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn partial_success_is_success() {
    let h = Harness::builder().build();
    h.generator.script(
        "badkey",
        vec![Step::Fail(GenerationError::Auth("key revoked".into()))],
    );
    let job_id = h.submit("standard", &["ok-1", "badkey", "ok-2"]).await;

    let job = h.run_next().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.aggregate.succeeded, 2);
    assert_eq!(job.aggregate.failed, 1);
    assert_eq!(job.aggregate.total, 3);
    // Only succeeded items are billed.
    assert!((job.aggregate.cost - 2.0 * DEFAULT_COST).abs() < 1e-9);

    let results = h.results(job_id).await;
    assert_eq!(results[1].status, SubTaskStatus::Failed);
    assert_eq!(results[1].error_kind, Some(ErrorKind::InvalidCredential));
    assert!(results[1].output_ref.is_none());
}

#[tokio::test]
async fn job_fails_only_when_every_item_fails() {
    let h = Harness::builder().build();
    for prompt in ["p-0", "p-1"] {
        h.generator.script(
            prompt,
            vec![Step::Fail(GenerationError::ContentPolicy("refused".into()))],
        );
    }
    let job_id = h.submit("standard", &["p-0", "p-1"]).await;

    let job = h.run_next().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.aggregate.succeeded, 0);
    assert_eq!(job.aggregate.failed, 2);
    assert_eq!(job.aggregate.cost, 0.0);
    for result in h.results(job_id).await {
        assert_eq!(result.error_kind, Some(ErrorKind::ContentPolicy));
    }
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let h = Harness::builder().build();
    h.generator.script(
        "flaky",
        vec![
            Step::Fail(GenerationError::Network("connection reset".into())),
            Step::Fail(GenerationError::Remote {
                status: 503,
                message: "unavailable".into(),
            }),
            Step::Succeed { cost: 0.04 },
        ],
    );
    let job_id = h.submit("standard", &["flaky"]).await;

    let job = h.run_next().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.generator.calls(), 3);
    let results = h.results(job_id).await;
    assert_eq!(results[0].status, SubTaskStatus::Completed);
    assert!((results[0].cost - 0.04).abs() < 1e-9);
    // Wall-clock time spans every attempt: two backoffs (1ms + 2ms
    // under the harness policy) must be included.
    assert!(
        results[0].processing_time_ms >= 3,
        "processing_time_ms {} does not cover the backoff delays",
        results[0].processing_time_ms
    );
}

#[tokio::test]
async fn exhausted_transient_retries_fail_the_item() {
    let h = Harness::builder().build();
    h.generator.script(
        "down",
        (0..10)
            .map(|_| {
                Step::Fail(GenerationError::Remote {
                    status: 502,
                    message: "bad gateway".into(),
                })
            })
            .collect(),
    );
    let job_id = h.submit("standard", &["down"]).await;

    let job = h.run_next().await;

    assert_eq!(job.status, JobStatus::Failed);
    // max_attempts from the harness retry policy.
    assert_eq!(h.generator.calls(), 4);
    let results = h.results(job_id).await;
    assert_eq!(results[0].error_kind, Some(ErrorKind::TransientExhausted));
}

#[tokio::test]
async fn rate_limit_stretches_the_batch_across_windows() {
    let window = Duration::from_millis(300);
    let h = Harness::builder()
        .prompt_concurrency(5)
        .rate_limit("standard", 2, window)
        .build();
    h.submit("standard", &["a", "b", "c", "d", "e"]).await;

    let started = Instant::now();
    let job = h.run_next().await;
    let elapsed = started.elapsed();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.aggregate.succeeded, 5);
    assert_eq!(job.aggregate.total, 5);
    // 5 items at 2 per window need at least 3 windows; even with the
    // first window nearly spent at start, a full extra window elapses.
    assert!(
        elapsed >= window,
        "batch finished too fast: {elapsed:?}"
    );
}

#[tokio::test]
async fn unknown_capability_fails_every_item() {
    let h = Harness::builder().build();
    let job_id = h.submit("turbo", &["a", "b"]).await;

    let job = h.run_next().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(h.generator.calls(), 0);
    for result in h.results(job_id).await {
        assert_eq!(result.error_kind, Some(ErrorKind::MalformedInput));
    }
}

#[tokio::test]
async fn storage_failure_fails_the_item_not_the_run() {
    let h = Harness::builder().broken_artifacts().build();
    let job_id = h.submit("standard", &["a"]).await;

    let job = h.run_next().await;

    assert_eq!(job.status, JobStatus::Failed);
    let results = h.results(job_id).await;
    assert_eq!(results[0].error_kind, Some(ErrorKind::StorageFailed));
    assert_matches!(results[0].error_message.as_deref(), Some(m) if m.contains("disk full"));
}

#[tokio::test]
async fn results_keep_submission_order_despite_completion_order() {
    let h = Harness::builder().prompt_concurrency(3).build();
    // First item finishes last, last item finishes first.
    h.generator
        .script("first", vec![Step::Delay(Duration::from_millis(60))]);
    h.generator
        .script("second", vec![Step::Delay(Duration::from_millis(20))]);
    let job_id = h.submit("standard", &["first", "second", "third"]).await;

    h.run_next().await;

    let progress = job_progress(h.store.as_ref(), job_id)
        .await
        .unwrap()
        .unwrap();
    let indexes: Vec<i32> = progress.results.iter().map(|r| r.item_index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert!(progress
        .results
        .iter()
        .all(|r| r.status == SubTaskStatus::Completed));
}

#[tokio::test]
async fn redelivered_job_does_not_double_count() {
    let h = Harness::builder().build();
    let job_id = h.submit("standard", &["a", "b"]).await;

    let first = h.run_next().await;
    assert_eq!(first.status, JobStatus::Completed);
    let cost_before = first.aggregate.cost;
    let calls_before = h.generator.calls();

    // The queue redelivers: the job looks claimed again, but all its
    // sub-task rows are already terminal.
    h.store.force_status(job_id, JobStatus::Processing);
    let redelivered = h.store.get_job(job_id).await.unwrap().unwrap();
    h.worker
        .run_job(redelivered, &CancellationToken::new())
        .await
        .unwrap();

    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.aggregate.succeeded, 2);
    assert_eq!(job.aggregate.failed, 0);
    assert!((job.aggregate.cost - cost_before).abs() < 1e-9);
    // Resolved items are never sent to the provider again.
    assert_eq!(h.generator.calls(), calls_before);
}

#[tokio::test]
async fn double_finalize_is_a_no_op() {
    let h = Harness::builder().build();
    let job_id = h.submit("standard", &["a"]).await;
    let job = h.run_next().await;
    assert_eq!(job.status, JobStatus::Completed);

    let again = h
        .store
        .finalize_job(job_id, JobStatus::Failed, &JobAggregate::empty())
        .await
        .unwrap();
    assert!(!again);
    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn cancellation_is_cooperative() {
    let h = Harness::builder().prompt_concurrency(1).build();
    let gate = Arc::new(Semaphore::new(0));
    h.generator.script("slow", vec![Step::WaitFor(gate.clone())]);
    let job_id = h.submit("standard", &["fast", "slow", "never-started"]).await;

    let job = h.store.claim_next().await.unwrap().unwrap();
    let worker = h.worker.clone();
    let shutdown = CancellationToken::new();
    let run = tokio::spawn(async move { worker.run_job(job, &shutdown).await });

    // Wait until the first item resolved and the second is in flight.
    let store = h.store.clone();
    let generator = h.generator.clone();
    wait_until(move || {
        let first_done = store
            .results
            .lock()
            .unwrap()
            .get(&(job_id, 0))
            .is_some_and(|r| r.status == SubTaskStatus::Completed);
        first_done && generator.calls() >= 2
    })
    .await;

    assert!(h.cancels.cancel(job_id));
    // Release the in-flight attempt; it must be allowed to finish.
    gate.add_permits(1);
    run.await.unwrap().unwrap();

    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    let results = h.results(job_id).await;
    assert_eq!(results[0].status, SubTaskStatus::Completed);
    assert_eq!(results[1].status, SubTaskStatus::Completed);
    assert_eq!(results[2].status, SubTaskStatus::Failed);
    assert_eq!(results[2].error_kind, Some(ErrorKind::Cancelled));

    // Two of three made it: partial success is still success.
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.aggregate.succeeded, 2);
    assert_eq!(job.aggregate.failed, 1);
}

#[tokio::test]
async fn events_are_published_through_the_job_lifecycle() {
    let h = Harness::builder().build();
    let mut rx = h.events.subscribe();
    h.submit("standard", &["a", "b"]).await;

    let job = h.run_next().await;
    assert_eq!(job.status, JobStatus::Completed);

    let mut resolved = 0;
    let mut progress = 0;
    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            JobEvent::SubTaskResolved { .. } => resolved += 1,
            JobEvent::Progress { .. } => progress += 1,
            JobEvent::Completed { aggregate, .. } => {
                completed = true;
                assert_eq!(aggregate.succeeded, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(resolved, 2);
    assert!(progress >= 1);
    assert!(completed);
}

#[tokio::test]
async fn progress_never_regresses_under_concurrent_resolutions() {
    let h = Harness::builder().prompt_concurrency(8).build();
    let mut rx = h.events.subscribe();
    let prompts: Vec<String> = (0..12).map(|i| format!("p-{i}")).collect();
    let refs: Vec<&str> = prompts.iter().map(String::as_str).collect();
    h.submit("standard", &refs).await;

    let job = h.run_next().await;
    assert_eq!(job.aggregate.succeeded, 12);

    // Concurrently resolving items must publish monotonically growing
    // aggregates; a stale snapshot overwriting a newer one would show
    // up as a dip here.
    let mut last_resolved = 0;
    while let Ok(event) = rx.try_recv() {
        if let JobEvent::Progress { aggregate, .. } = event {
            let resolved = aggregate.succeeded + aggregate.failed;
            assert!(
                resolved >= last_resolved,
                "progress regressed from {last_resolved} to {resolved}"
            );
            last_resolved = resolved;
        }
    }
    assert_eq!(last_resolved, 12);
}

#[tokio::test]
async fn progress_is_visible_mid_job() {
    let h = Harness::builder().prompt_concurrency(1).build();
    let gate = Arc::new(Semaphore::new(0));
    h.generator.script("gated", vec![Step::WaitFor(gate.clone())]);
    let job_id = h.submit("standard", &["quick", "gated"]).await;

    let job = h.store.claim_next().await.unwrap().unwrap();
    let worker = h.worker.clone();
    let shutdown = CancellationToken::new();
    let run = tokio::spawn(async move { worker.run_job(job, &shutdown).await });

    let store = h.store.clone();
    wait_until(move || {
        let jobs = store.jobs.lock().unwrap();
        jobs.get(&job_id).is_some_and(|j| j.aggregate.succeeded == 1)
    })
    .await;

    let progress = job_progress(h.store.as_ref(), job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(progress.job.status, JobStatus::Processing);
    assert_eq!(progress.job.aggregate.succeeded, 1);
    assert_eq!(progress.job.aggregate.total, 2);
    assert!(!progress.job.aggregate.is_settled());

    gate.add_permits(1);
    run.await.unwrap().unwrap();

    let job = h.store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn submission_validation_rejects_blank_prompts() {
    let h = Harness::builder().build();
    let result = submit_job(h.store.as_ref(), h.submission("standard", &["ok", "  "])).await;
    assert!(result.is_err());
    // Nothing was enqueued.
    assert!(h.store.claim_next().await.unwrap().is_none());
}
