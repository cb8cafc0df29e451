use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError, JoinHandle};

use super::message::JobMessage;
use super::record::{JobInfo, Transition};
use super::state::JobState;
use crate::error::InvokerError;
use crate::runner::{PipelineResult, PipelineRunner, PipelineState};

type StateListener = Box<dyn FnMut(JobState) + Send>;
type MessageListener = Box<dyn FnMut(&JobMessage) + Send>;

/// How the run task settled, as seen by cancellation and waiters.
enum Settlement<T> {
    Completed(Option<Arc<T>>),
    Failed,
}

impl<T> Clone for Settlement<T> {
    fn clone(&self) -> Self {
        match self {
            Settlement::Completed(result) => Settlement::Completed(result.clone()),
            Settlement::Failed => Settlement::Failed,
        }
    }
}

/// The in-flight run task.
struct Execution<T> {
    abort: AbortHandle,
    settled: watch::Receiver<Option<Settlement<T>>>,
}

/// Everything guarded by the invocation lock.
struct Shared<T> {
    state: JobState,
    transitions: Vec<Transition>,
    state_tx: watch::Sender<JobState>,
    execution: Option<Execution<T>>,
    state_listeners: Vec<StateListener>,
    message_listeners: Vec<MessageListener>,
}

struct Inner<T> {
    id: String,
    shared: Mutex<Shared<T>>,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the new state and notify every state listener, in order.
    fn set_state(&self, shared: &mut Shared<T>, state: JobState) {
        tracing::debug!(
            job_id = %self.id,
            from = %shared.state,
            to = %state,
            "job state transition"
        );
        shared.state = state;
        shared.transitions.push(Transition {
            state,
            at: Utc::now(),
        });
        shared.state_tx.send_replace(state);
        for listener in shared.state_listeners.iter_mut() {
            listener(state);
        }
    }

    fn send_message(&self, shared: &mut Shared<T>, message: JobMessage) {
        for listener in shared.message_listeners.iter_mut() {
            listener(&message);
        }
    }

    fn fail(&self, shared: &mut Shared<T>, err: anyhow::Error) {
        tracing::error!(job_id = %self.id, error = ?err, "error during job invocation");
        self.send_message(shared, JobMessage::debug(format!("{err:?}")));
        self.send_message(shared, JobMessage::error(err.root_cause().to_string()));
        self.set_state(shared, JobState::Failed);
    }
}

impl<T: PipelineResult> Inner<T> {
    /// Apply the outcome of the run task.
    fn complete(&self, outcome: Result<anyhow::Result<Option<T>>, JoinError>) -> Settlement<T> {
        let mut shared = self.lock();
        match outcome {
            Ok(Ok(Some(result))) => {
                let reported = result.state();
                if reported == PipelineState::Done {
                    self.set_state(&mut shared, JobState::Done);
                } else {
                    tracing::error!(
                        job_id = %self.id,
                        pipeline_state = %reported,
                        "runner reported success on a non-DONE state"
                    );
                    self.send_message(
                        &mut shared,
                        JobMessage::error(format!("Success on non-DONE state: {reported}")),
                    );
                    self.set_state(&mut shared, JobState::Failed);
                }
                Settlement::Completed(Some(Arc::new(result)))
            }
            Ok(Ok(None)) => {
                self.set_state(&mut shared, JobState::Unspecified);
                Settlement::Completed(None)
            }
            Ok(Err(err)) => {
                self.fail(&mut shared, err);
                Settlement::Failed
            }
            Err(join_err) => {
                let err = anyhow::Error::new(join_err).context("pipeline task did not complete");
                self.fail(&mut shared, err);
                Settlement::Failed
            }
        }
    }

    fn report_cancel_failure(&self, err: anyhow::Error) {
        tracing::warn!(
            job_id = %self.id,
            error = %err,
            "failed to propagate cancellation to the runner"
        );
        let mut shared = self.lock();
        self.send_message(
            &mut shared,
            JobMessage::warning(format!("Failed to cancel job {}: {err}", self.id)),
        );
    }
}

/// One invocation of a pipeline on a runner.
///
/// The invocation owns the job's lifecycle state and is its only writer.
/// Execution is dispatched onto the supplied tokio runtime; a completion task
/// on the same runtime reacts to the outcome. Every state change and message
/// is fanned out to listeners while holding the invocation lock, so all
/// listeners observe the same order.
///
/// Listeners run under that lock: they must return promptly and must not
/// call back into the invocation.
pub struct JobInvocation<R: PipelineRunner> {
    inner: Arc<Inner<R::Result>>,
    pipeline: Arc<R::Pipeline>,
    runner: Arc<R>,
    runtime: Handle,
}

impl<R: PipelineRunner> JobInvocation<R> {
    pub fn new(
        id: impl Into<String>,
        runtime: Handle,
        pipeline: R::Pipeline,
        runner: Arc<R>,
    ) -> Self {
        let (state_tx, _) = watch::channel(JobState::Stopped);
        let shared = Shared {
            state: JobState::Stopped,
            transitions: vec![Transition {
                state: JobState::Stopped,
                at: Utc::now(),
            }],
            state_tx,
            execution: None,
            state_listeners: Vec::new(),
            message_listeners: Vec::new(),
        };

        Self {
            inner: Arc::new(Inner {
                id: id.into(),
                shared: Mutex::new(shared),
            }),
            pipeline: Arc::new(pipeline),
            runner,
            runtime,
        }
    }

    /// Unique identifier for the invocation.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn pipeline(&self) -> &R::Pipeline {
        &self.pipeline
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().state
    }

    /// Start the job.
    ///
    /// Moves the job to `STARTING`, dispatches the run onto the runtime and
    /// moves it to `RUNNING` straight away: `RUNNING` means the run was
    /// dispatched, not that the runner has begun work. Fails without side
    /// effects unless the job is `STOPPED`.
    pub fn start(&self) -> Result<(), InvokerError> {
        tracing::info!(job_id = %self.id(), "starting job invocation");
        let mut shared = self.inner.lock();
        if shared.state != JobState::Stopped {
            return Err(InvokerError::AlreadyStarted {
                job_id: self.id().to_string(),
                state: shared.state,
            });
        }

        self.inner.set_state(&mut shared, JobState::Starting);

        let runner = Arc::clone(&self.runner);
        let pipeline = Arc::clone(&self.pipeline);
        let run = self.runtime.spawn(async move { runner.run(pipeline).await });

        let (settled_tx, settled_rx) = watch::channel(None);
        shared.execution = Some(Execution {
            abort: run.abort_handle(),
            settled: settled_rx,
        });

        // TODO: defer RUNNING until the runner reports the pipeline is up.
        self.inner.set_state(&mut shared, JobState::Running);

        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(async move {
            let settlement = inner.complete(run.await);
            settled_tx.send_replace(Some(settlement));
        });

        Ok(())
    }

    /// Cancel the job.
    ///
    /// Aborts the run task and, once it has settled, asks any result it
    /// produced to cancel itself. Cancellation is best effort: the state is
    /// left to the completion handling installed by [`start`](Self::start),
    /// and a failure to cancel the result is reported as a warning message.
    ///
    /// Returns `None` if the job was never started, otherwise the handle of
    /// the task propagating the cancellation.
    pub fn cancel(&self) -> Option<JoinHandle<()>> {
        tracing::info!(job_id = %self.id(), "cancelling job invocation");
        let mut settled = {
            let shared = self.inner.lock();
            let execution = shared.execution.as_ref()?;
            execution.abort.abort();
            execution.settled.clone()
        };

        let inner = Arc::clone(&self.inner);
        Some(self.runtime.spawn(async move {
            let settlement = {
                let Ok(current) = settled.wait_for(Option::is_some).await else {
                    return;
                };
                current.clone()
            };

            if let Some(Settlement::Completed(Some(result))) = settlement {
                match result.cancel().await {
                    Ok(state) => {
                        tracing::debug!(
                            job_id = %inner.id,
                            pipeline_state = %state,
                            "cancellation propagated to the runner"
                        );
                    }
                    Err(err) => inner.report_cancel_failure(err),
                }
            }
        }))
    }

    /// Listen for state changes.
    ///
    /// The listener is called with the current state right away, then with
    /// every later transition.
    pub fn add_state_listener<F>(&self, mut listener: F)
    where
        F: FnMut(JobState) + Send + 'static,
    {
        let mut shared = self.inner.lock();
        listener(shared.state);
        shared.state_listeners.push(Box::new(listener));
    }

    /// Listen for diagnostic messages emitted from now on.
    pub fn add_message_listener<F>(&self, listener: F)
    where
        F: FnMut(&JobMessage) + Send + 'static,
    {
        self.inner.lock().message_listeners.push(Box::new(listener));
    }

    /// A receiver that always holds the latest state.
    pub fn subscribe_state(&self) -> watch::Receiver<JobState> {
        self.inner.lock().state_tx.subscribe()
    }

    /// Wait until the outcome of the run has been applied and return the
    /// resulting state. Returns the current state at once if the job was
    /// never started.
    pub async fn wait_for_completion(&self) -> JobState {
        let mut settled = {
            let shared = self.inner.lock();
            match &shared.execution {
                Some(execution) => execution.settled.clone(),
                None => return shared.state,
            }
        };
        let _ = settled.wait_for(Option::is_some).await;
        self.state()
    }

    pub fn info(&self) -> JobInfo {
        let shared = self.inner.lock();
        JobInfo::from_transitions(&self.inner.id, &shared.transitions)
    }
}

impl<R: PipelineRunner> std::fmt::Debug for JobInvocation<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobInvocation")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{Context, anyhow};
    use tokio::sync::Notify;

    use super::*;
    use crate::invocation::message::MessageImportance;

    #[derive(Clone)]
    enum Script {
        Done,
        NonDone(PipelineState),
        Empty,
        Fail(&'static str),
        Panic(&'static str),
        Hang,
    }

    struct MockRunner {
        script: Script,
        gate: Option<Arc<Notify>>,
        runs: AtomicUsize,
        cancels: Arc<AtomicUsize>,
        fail_cancel: bool,
    }

    impl MockRunner {
        fn new(script: Script) -> Self {
            Self {
                script,
                gate: None,
                runs: AtomicUsize::new(0),
                cancels: Arc::new(AtomicUsize::new(0)),
                fail_cancel: false,
            }
        }

        fn gated(script: Script, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(script)
            }
        }
    }

    struct MockResult {
        state: PipelineState,
        cancels: Arc<AtomicUsize>,
        fail_cancel: bool,
    }

    impl PipelineResult for MockResult {
        fn state(&self) -> PipelineState {
            self.state
        }

        async fn cancel(&self) -> anyhow::Result<PipelineState> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            if self.fail_cancel {
                return Err(anyhow!("runner unreachable"));
            }
            Ok(self.state)
        }
    }

    impl PipelineRunner for MockRunner {
        type Pipeline = String;
        type Result = MockResult;

        async fn run(&self, pipeline: Arc<String>) -> anyhow::Result<Option<MockResult>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let result = |state| MockResult {
                state,
                cancels: Arc::clone(&self.cancels),
                fail_cancel: self.fail_cancel,
            };
            match self.script.clone() {
                Script::Done => Ok(Some(result(PipelineState::Done))),
                Script::NonDone(state) => Ok(Some(result(state))),
                Script::Empty => Ok(None),
                Script::Fail(cause) => {
                    Err(anyhow!(cause)).with_context(|| format!("running {pipeline}"))
                }
                Script::Panic(reason) => panic!("{reason}"),
                Script::Hang => std::future::pending().await,
            }
        }
    }

    fn invocation(runner: MockRunner) -> (JobInvocation<MockRunner>, Arc<MockRunner>) {
        let runner = Arc::new(runner);
        let job = JobInvocation::new(
            "job-1",
            Handle::current(),
            "wordcount".to_string(),
            Arc::clone(&runner),
        );
        (job, runner)
    }

    fn record_states(job: &JobInvocation<MockRunner>) -> Arc<Mutex<Vec<JobState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        job.add_state_listener(move |state| sink.lock().unwrap().push(state));
        seen
    }

    fn record_messages(job: &JobInvocation<MockRunner>) -> Arc<Mutex<Vec<JobMessage>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        job.add_message_listener(move |msg| sink.lock().unwrap().push(msg.clone()));
        seen
    }

    #[tokio::test]
    async fn listener_before_start_sees_full_lifecycle() {
        let (job, _) = invocation(MockRunner::new(Script::Done));
        let states = record_states(&job);
        let messages = record_messages(&job);

        job.start().unwrap();
        assert_eq!(job.wait_for_completion().await, JobState::Done);

        assert_eq!(
            *states.lock().unwrap(),
            vec![JobState::Stopped, JobState::Starting, JobState::Running, JobState::Done]
        );
        assert!(messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_start_fails_without_side_effects() {
        let gate = Arc::new(Notify::new());
        let (job, runner) = invocation(MockRunner::gated(Script::Done, Arc::clone(&gate)));

        job.start().unwrap();
        let states = record_states(&job);

        let err = job.start().unwrap_err();
        match err {
            InvokerError::AlreadyStarted { job_id, state } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(state, JobState::Running);
            }
            other => panic!("expected AlreadyStarted, got {other:?}"),
        }
        assert_eq!(job.state(), JobState::Running);
        assert_eq!(*states.lock().unwrap(), vec![JobState::Running]);

        gate.notify_one();
        assert_eq!(job.wait_for_completion().await, JobState::Done);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_listener_catches_up_with_running() {
        let gate = Arc::new(Notify::new());
        let (job, _) = invocation(MockRunner::gated(Script::Done, Arc::clone(&gate)));

        job.start().unwrap();
        let states = record_states(&job);
        assert_eq!(*states.lock().unwrap(), vec![JobState::Running]);

        gate.notify_one();
        job.wait_for_completion().await;
        assert_eq!(*states.lock().unwrap(), vec![JobState::Running, JobState::Done]);
    }

    #[tokio::test]
    async fn state_listeners_notified_in_registration_order() {
        let (job, _) = invocation(MockRunner::new(Script::Empty));
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let sink = Arc::clone(&log);
            job.add_state_listener(move |state| {
                sink.lock().unwrap().push(format!("{tag}:{state}"))
            });
        }

        job.start().unwrap();
        job.wait_for_completion().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:STOPPED",
                "b:STOPPED",
                "a:STARTING",
                "b:STARTING",
                "a:RUNNING",
                "b:RUNNING",
                "a:UNSPECIFIED",
                "b:UNSPECIFIED",
            ]
        );
    }

    #[tokio::test]
    async fn failure_emits_trace_and_root_cause_before_failed() {
        let (job, _) = invocation(MockRunner::new(Script::Fail("out of memory")));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        job.add_state_listener(move |state| {
            sink.lock().unwrap().push(format!("state:{state}"))
        });
        let sink = Arc::clone(&events);
        job.add_message_listener(move |msg| {
            sink.lock().unwrap().push(format!("message:{}", msg.importance))
        });
        let messages = record_messages(&job);

        job.start().unwrap();
        assert_eq!(job.wait_for_completion().await, JobState::Failed);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "state:STOPPED",
                "state:STARTING",
                "state:RUNNING",
                "message:debug",
                "message:error",
                "state:FAILED",
            ]
        );

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].importance, MessageImportance::Debug);
        assert!(messages[0].text.contains("running wordcount"));
        assert!(messages[0].text.contains("out of memory"));
        assert_eq!(messages[1].importance, MessageImportance::Error);
        assert_eq!(messages[1].text, "out of memory");
    }

    #[tokio::test]
    async fn empty_result_ends_unspecified() {
        let (job, _) = invocation(MockRunner::new(Script::Empty));
        let messages = record_messages(&job);

        job.start().unwrap();
        let state = job.wait_for_completion().await;

        assert_eq!(state, JobState::Unspecified);
        assert!(!state.is_terminated());
        assert!(messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_done_result_fails_with_message() {
        let (job, _) = invocation(MockRunner::new(Script::NonDone(PipelineState::Running)));
        let messages = record_messages(&job);

        job.start().unwrap();
        assert_eq!(job.wait_for_completion().await, JobState::Failed);

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].importance, MessageImportance::Error);
        assert_eq!(messages[0].text, "Success on non-DONE state: RUNNING");
    }

    #[tokio::test]
    async fn cancel_before_start_is_noop() {
        let (job, runner) = invocation(MockRunner::new(Script::Done));
        let states = record_states(&job);
        let messages = record_messages(&job);

        assert!(job.cancel().is_none());

        assert_eq!(job.state(), JobState::Stopped);
        assert_eq!(*states.lock().unwrap(), vec![JobState::Stopped]);
        assert!(messages.lock().unwrap().is_empty());
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_after_completion_cancels_result() {
        let (job, runner) = invocation(MockRunner::new(Script::Done));
        let states = record_states(&job);

        job.start().unwrap();
        job.wait_for_completion().await;
        job.cancel().unwrap().await.unwrap();

        assert_eq!(runner.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(job.state(), JobState::Done);
        assert_eq!(states.lock().unwrap().last(), Some(&JobState::Done));
    }

    #[tokio::test]
    async fn cancel_propagation_failure_reports_warning() {
        let (job, runner) = invocation(MockRunner {
            fail_cancel: true,
            ..MockRunner::new(Script::Done)
        });
        let messages = record_messages(&job);

        job.start().unwrap();
        job.wait_for_completion().await;
        job.cancel().unwrap().await.unwrap();

        assert_eq!(runner.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(job.state(), JobState::Done);
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].importance, MessageImportance::Warning);
        assert_eq!(messages[0].text, "Failed to cancel job job-1: runner unreachable");
    }

    #[tokio::test]
    async fn runner_panic_fails_job() {
        let (job, _) = invocation(MockRunner::new(Script::Panic("engine exploded")));
        let states = record_states(&job);
        let messages = record_messages(&job);

        job.start().unwrap();
        assert_eq!(job.wait_for_completion().await, JobState::Failed);

        assert_eq!(states.lock().unwrap().last(), Some(&JobState::Failed));
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].importance, MessageImportance::Debug);
        assert_eq!(messages[1].importance, MessageImportance::Error);
        assert!(messages[1].text.contains("panicked"));
        assert!(messages[1].text.contains("engine exploded"));
    }

    #[tokio::test]
    async fn cancel_in_flight_run_fails_job() {
        let (job, runner) = invocation(MockRunner::new(Script::Hang));
        let messages = record_messages(&job);

        job.start().unwrap();
        job.cancel().unwrap().await.unwrap();

        assert_eq!(job.wait_for_completion().await, JobState::Failed);
        assert_eq!(runner.cancels.load(Ordering::SeqCst), 0);
        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].text.contains("cancelled"));
    }

    #[tokio::test]
    async fn message_listener_has_no_catch_up() {
        let (job, _) = invocation(MockRunner::new(Script::Fail("boom")));
        job.start().unwrap();
        job.wait_for_completion().await;

        let messages = record_messages(&job);
        assert!(messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wait_without_start_returns_current_state() {
        let (job, _) = invocation(MockRunner::new(Script::Done));
        assert_eq!(job.wait_for_completion().await, JobState::Stopped);
    }

    #[tokio::test]
    async fn subscribe_state_holds_latest_value() {
        let (job, _) = invocation(MockRunner::new(Script::Done));
        let rx = job.subscribe_state();
        assert_eq!(*rx.borrow(), JobState::Stopped);

        job.start().unwrap();
        assert_eq!(*rx.borrow(), JobState::Running);

        job.wait_for_completion().await;
        assert_eq!(*rx.borrow(), JobState::Done);
    }

    #[tokio::test]
    async fn info_records_every_transition() {
        let (job, _) = invocation(MockRunner::new(Script::Done));
        job.start().unwrap();
        job.wait_for_completion().await;

        let info = job.info();
        assert_eq!(info.job_id, "job-1");
        assert_eq!(info.state, JobState::Done);
        assert_eq!(
            info.state_history,
            vec![JobState::Stopped, JobState::Starting, JobState::Running, JobState::Done]
        );
        assert!(info.duration_ms >= 0);
    }

    #[tokio::test]
    async fn accessors() {
        let (job, _) = invocation(MockRunner::new(Script::Done));
        assert_eq!(job.id(), "job-1");
        assert_eq!(job.pipeline(), "wordcount");
        assert_eq!(job.state(), JobState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_dispatch_once() {
        let (job, runner) = invocation(MockRunner::new(Script::Done));
        let job = Arc::new(job);

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let job = Arc::clone(&job);
                tokio::spawn(async move { job.start().is_ok() })
            })
            .collect();

        let mut started = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(job.wait_for_completion().await, JobState::Done);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }
}
