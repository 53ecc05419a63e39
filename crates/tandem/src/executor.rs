//! The series and parallel executors
//!
//! Both executors share one shape: tasks are dispatched with a continuation
//! whose invocation updates the run's context synchronously (break flag,
//! remaining count) and defers the actual resumption through the scheduler.
//! Nothing re-enters dispatch logic from inside a continuation invocation, so
//! a fully synchronous task list cannot grow the stack and a completion
//! continuation fires exactly once per run.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, trace};

use crate::continuation::Continuation;
use crate::error::{TandemError, TandemResult, TaskError};
use crate::scheduler::{Schedule, TokioScheduler};
use crate::task::{Task, TaskBody, TaskFn};
use crate::types::Values;

/// The completion continuation of one executor run.
///
/// Invoked exactly once per run, with the error of the failing task or, on
/// success, the values threaded out of the final task (series) or nothing
/// (parallel).
pub struct Completion {
    f: Box<dyn FnOnce(Option<TaskError>, Values) + Send>,
}

impl Completion {
    pub fn new(f: impl FnOnce(Option<TaskError>, Values) + Send + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    fn call(self, error: Option<TaskError>, values: Values) {
        (self.f)(error, values)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// Runs task lists in series or parallel over a deferred scheduler.
#[derive(Clone)]
pub struct Executor {
    scheduler: Arc<dyn Schedule>,
}

impl Executor {
    /// An executor deferring onto the ambient tokio runtime.
    pub fn new() -> TandemResult<Self> {
        Ok(Self::with_scheduler(Arc::new(TokioScheduler::current()?)))
    }

    /// An executor deferring onto `scheduler`.
    pub fn with_scheduler(scheduler: Arc<dyn Schedule>) -> Self {
        Self { scheduler }
    }

    /// Run a single task; equivalent to a one-element series.
    pub fn run(&self, task: Task, completion: Option<Completion>) -> TandemResult<()> {
        self.series(vec![task], completion)
    }

    /// Run `tasks` strictly in list order.
    ///
    /// The values of each task's latest continuation invocation are threaded
    /// into the next task, and into `completion` when the list is exhausted.
    /// The first reported error short-circuits the run: no later task
    /// dispatches and `completion` receives the error verbatim. An empty list
    /// completes immediately with no values. Without a completion, a failing
    /// chain halts silently.
    ///
    /// A malformed task list is rejected synchronously, before any task
    /// dispatches; `completion` is never invoked in that case.
    pub fn series(&self, tasks: Vec<Task>, completion: Option<Completion>) -> TandemResult<()> {
        validate(&tasks)?;
        debug!(tasks = tasks.len(), "starting series run");
        let had_completion = completion.is_some();
        let run = Arc::new(SeriesRun {
            scheduler: Arc::clone(&self.scheduler),
            queue: Mutex::new(tasks.into_iter().collect()),
            broken: AtomicBool::new(false),
            completion: Mutex::new(completion),
            had_completion,
            index: AtomicUsize::new(0),
        });
        dispatch_series(run, Values::new());
        Ok(())
    }

    /// Dispatch every task at once and signal completion exactly once.
    ///
    /// All tasks are dispatched eagerly in list order; completion order among
    /// them is unspecified. `completion` fires once, with the first reported
    /// error or with no error once every task has finished. Tasks already in
    /// flight when an error is reported are not cancelled; their outcomes are
    /// absorbed without re-triggering `completion`. Parallel completion
    /// carries no values.
    pub fn parallel(&self, tasks: Vec<Task>, completion: Option<Completion>) -> TandemResult<()> {
        validate(&tasks)?;
        debug!(tasks = tasks.len(), "starting parallel run");
        if tasks.is_empty() {
            if let Some(completion) = completion {
                debug!("parallel run complete");
                completion.call(None, Values::new());
            }
            return Ok(());
        }
        let had_completion = completion.is_some();
        let run = Arc::new(ParallelRun {
            scheduler: Arc::clone(&self.scheduler),
            state: Mutex::new(ParallelState {
                remaining: tasks.len(),
                broken: false,
                completed: false,
            }),
            completion: Mutex::new(completion),
            had_completion,
        });
        for (index, task) in tasks.into_iter().enumerate() {
            if run.state.lock().unwrap_or_else(PoisonError::into_inner).broken {
                trace!(index, "not dispatching after synchronous failure");
                break;
            }
            dispatch_parallel(&run, task, index);
        }
        Ok(())
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

fn validate(tasks: &[Task]) -> TandemResult<()> {
    for (index, task) in tasks.iter().enumerate() {
        if task.step_count() == Some(0) {
            return Err(TandemError::invalid_task(
                index,
                "step task has no suspension points",
            ));
        }
    }
    Ok(())
}

fn take_completion(slot: &Mutex<Option<Completion>>) -> Option<Completion> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Dispatches a task body, catching a panic at the boundary.
///
/// A caught fault is routed through a clone of the task's own continuation,
/// so a body that panicked after signaling cannot double-advance the run.
/// Without a completion the payload is re-raised rather than swallowed.
fn run_task_body(f: TaskFn, values: Values, cont: Continuation, had_completion: bool) {
    let guard = cont.clone();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || f(values, cont))) {
        if had_completion {
            error!("task body panicked during dispatch; reporting through its continuation");
            guard.invoke(Some(TaskError::from_panic(payload)), Values::new());
        } else {
            panic::resume_unwind(payload);
        }
    }
}

/// Context of one series run.
struct SeriesRun {
    scheduler: Arc<dyn Schedule>,
    /// Tasks not yet dispatched.
    queue: Mutex<VecDeque<Task>>,
    /// Set on the first error; no task past the failing index dispatches.
    broken: AtomicBool,
    /// Taken exactly once, by whichever event finishes the run.
    completion: Mutex<Option<Completion>>,
    had_completion: bool,
    index: AtomicUsize,
}

fn dispatch_series(run: Arc<SeriesRun>, values: Values) {
    if run.broken.load(Ordering::Acquire) {
        return;
    }
    let task = run
        .queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front();
    let Some(task) = task else {
        if let Some(completion) = take_completion(&run.completion) {
            debug!("series run complete");
            completion.call(None, values);
        }
        return;
    };
    let index = run.index.fetch_add(1, Ordering::Relaxed);
    debug!(index, task = %task.label(), "dispatching series task");
    let had_completion = run.had_completion;
    match task.body {
        TaskBody::Plain(f) => {
            let cont = plain_series_continuation(&run);
            run_task_body(f, values, cont, had_completion);
        }
        TaskBody::Steps(steps) => {
            let steps = steps.into_iter().map(|step| step.f).collect();
            run_series_step(run, steps, values);
        }
    }
}

fn plain_series_continuation(run: &Arc<SeriesRun>) -> Continuation {
    let run = Arc::clone(run);
    let scheduler = Arc::clone(&run.scheduler);
    Continuation::new(
        scheduler,
        Box::new(move |error, values| match error {
            Some(error) => break_series(&run, error, values),
            None => {
                let scheduler = Arc::clone(&run.scheduler);
                scheduler.defer(Box::new(move || dispatch_series(run, values)));
            }
        }),
    )
}

fn run_series_step(run: Arc<SeriesRun>, mut remaining: VecDeque<TaskFn>, values: Values) {
    let Some(step) = remaining.pop_front() else {
        // the step task is done; its last resumption values thread onward
        dispatch_series(run, values);
        return;
    };
    let had_completion = run.had_completion;
    let cont = step_series_continuation(&run, remaining);
    run_task_body(step, values, cont, had_completion);
}

fn step_series_continuation(run: &Arc<SeriesRun>, remaining: VecDeque<TaskFn>) -> Continuation {
    let run = Arc::clone(run);
    let scheduler = Arc::clone(&run.scheduler);
    Continuation::new(
        scheduler,
        Box::new(move |error, values| match error {
            Some(error) => break_series(&run, error, values),
            None => {
                let scheduler = Arc::clone(&run.scheduler);
                scheduler.defer(Box::new(move || run_series_step(run, remaining, values)));
            }
        }),
    )
}

fn break_series(run: &Arc<SeriesRun>, error: TaskError, values: Values) {
    run.broken.store(true, Ordering::Release);
    match take_completion(&run.completion) {
        Some(completion) => {
            debug!(error = ?error, "series task failed; short-circuiting");
            let scheduler = Arc::clone(&run.scheduler);
            scheduler.defer(Box::new(move || completion.call(Some(error), values)));
        }
        None => debug!(error = ?error, "series task failed; no completion to notify"),
    }
}

/// Context of one parallel run.
struct ParallelRun {
    scheduler: Arc<dyn Schedule>,
    state: Mutex<ParallelState>,
    /// Taken exactly once, by whichever settle event completes the run.
    completion: Mutex<Option<Completion>>,
    had_completion: bool,
}

struct ParallelState {
    remaining: usize,
    broken: bool,
    /// Guards the completion continuation against firing more than once.
    completed: bool,
}

fn dispatch_parallel(run: &Arc<ParallelRun>, task: Task, index: usize) {
    debug!(index, task = %task.label(), "dispatching parallel task");
    let had_completion = run.had_completion;
    match task.body {
        TaskBody::Plain(f) => {
            let cont = plain_parallel_continuation(run);
            run_task_body(f, Values::new(), cont, had_completion);
        }
        TaskBody::Steps(steps) => {
            let steps = steps.into_iter().map(|step| step.f).collect();
            run_parallel_step(Arc::clone(run), steps, Values::new());
        }
    }
}

fn plain_parallel_continuation(run: &Arc<ParallelRun>) -> Continuation {
    let run = Arc::clone(run);
    let scheduler = Arc::clone(&run.scheduler);
    Continuation::new(
        scheduler,
        Box::new(move |error, _values| settle_parallel(&run, error)),
    )
}

fn run_parallel_step(run: Arc<ParallelRun>, mut remaining: VecDeque<TaskFn>, values: Values) {
    let Some(step) = remaining.pop_front() else {
        settle_parallel(&run, None);
        return;
    };
    let had_completion = run.had_completion;
    let cont = {
        let run = Arc::clone(&run);
        let scheduler = Arc::clone(&run.scheduler);
        Continuation::new(
            scheduler,
            Box::new(move |error, values| match error {
                Some(error) => settle_parallel(&run, Some(error)),
                None => {
                    let scheduler = Arc::clone(&run.scheduler);
                    scheduler.defer(Box::new(move || run_parallel_step(run, remaining, values)));
                }
            }),
        )
    };
    run_task_body(step, values, cont, had_completion);
}

/// One task's completion event: decrement the remaining count and decide
/// whether the run is over. The `completed` flag makes the decision stick,
/// whatever order late events arrive in.
fn settle_parallel(run: &Arc<ParallelRun>, error: Option<TaskError>) {
    let mut state = run.state.lock().unwrap_or_else(PoisonError::into_inner);
    state.remaining -= 1;
    match error {
        Some(error) => {
            if state.completed {
                trace!(error = ?error, "absorbing task failure after the run completed");
                return;
            }
            state.completed = true;
            state.broken = true;
            drop(state);
            if let Some(completion) = take_completion(&run.completion) {
                debug!(error = ?error, "parallel run failed");
                let scheduler = Arc::clone(&run.scheduler);
                scheduler.defer(Box::new(move || completion.call(Some(error), Values::new())));
            }
        }
        None => {
            if state.completed || state.remaining > 0 {
                return;
            }
            state.completed = true;
            drop(state);
            if let Some(completion) = take_completion(&run.completion) {
                debug!("parallel run complete");
                let scheduler = Arc::clone(&run.scheduler);
                scheduler.defer(Box::new(move || completion.call(None, Values::new())));
            }
        }
    }
}
