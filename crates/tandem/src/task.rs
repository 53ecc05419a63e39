//! Task definitions: plain single-shot tasks and multi-step tasks

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::continuation::Continuation;
use crate::error::{TandemError, TaskError};
use crate::executor::{Completion, Executor};
use crate::types::Values;

/// Unique identifier for a task, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A one-shot operation: receives the values threaded from the previous
/// resumption and a continuation it must eventually invoke.
pub(crate) type TaskFn = Box<dyn FnOnce(Values, Continuation) + Send + 'static>;

/// One suspension point of a step task.
///
/// The closure receives the values carried by the previous point's
/// continuation invocation (for the first point, the values threaded from the
/// preceding task) and hands control back by invoking its own continuation.
pub struct Step {
    pub(crate) f: TaskFn,
}

impl Step {
    pub fn new(f: impl FnOnce(Values, Continuation) + Send + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

impl From<Task> for Step {
    /// Any task can serve as a suspension point: the nested run completes
    /// the point's continuation.
    fn from(task: Task) -> Self {
        Step::new(move |_values, cont| {
            let executor = Executor::with_scheduler(cont.scheduler());
            let forward = cont.clone();
            let completion = Completion::new(move |error, values| forward.invoke(error, values));
            if let Err(invalid) = executor.run(task, Some(completion)) {
                cont.fail(TaskError::new(invalid));
            }
        })
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Step")
    }
}

pub(crate) enum TaskBody {
    Plain(TaskFn),
    Steps(Vec<Step>),
}

/// A unit of work accepting a continuation and eventually invoking it once.
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) name: Option<String>,
    pub(crate) body: TaskBody,
}

impl Task {
    /// A task with no internal suspension points. `f` runs once at dispatch
    /// and must arrange for the continuation to be invoked when its work is
    /// done, however asynchronous that work is.
    pub fn plain(f: impl FnOnce(Values, Continuation) + Send + 'static) -> Self {
        Self {
            id: TaskId::new(),
            name: None,
            body: TaskBody::Plain(Box::new(f)),
        }
    }

    /// A task composed of an ordered sequence of suspension points, executed
    /// one at a time. Each point runs only after the previous point's
    /// continuation fired without error, and receives the values that
    /// invocation carried; the values given to the final point's continuation
    /// become the task's own yield.
    pub fn steps<I>(steps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Step>,
    {
        Self {
            id: TaskId::new(),
            name: None,
            body: TaskBody::Steps(steps.into_iter().map(Into::into).collect()),
        }
    }

    /// A task that runs `tasks` as a nested series and yields its outcome.
    ///
    /// The nested run owns an independent context and inherits the parent's
    /// scheduler; its completion forwards into the parent continuation, so a
    /// nested failure is indistinguishable from a flat suspension-point
    /// failure at the same depth.
    pub fn series(tasks: Vec<Task>) -> Self {
        Self::nested(tasks, |executor, tasks, completion| {
            executor.series(tasks, Some(completion))
        })
    }

    /// A task that runs `tasks` as a nested parallel fan-out.
    pub fn parallel(tasks: Vec<Task>) -> Self {
        Self::nested(tasks, |executor, tasks, completion| {
            executor.parallel(tasks, Some(completion))
        })
    }

    fn nested<D>(tasks: Vec<Task>, dispatch: D) -> Self
    where
        D: FnOnce(Executor, Vec<Task>, Completion) -> Result<(), TandemError> + Send + 'static,
    {
        Self::plain(move |_values, cont| {
            let executor = Executor::with_scheduler(cont.scheduler());
            let forward = cont.clone();
            let completion = Completion::new(move |error, values| forward.invoke(error, values));
            if let Err(invalid) = dispatch(executor, tasks, completion) {
                cont.fail(TaskError::new(invalid));
            }
        })
    }

    /// Adapt a future into a plain task.
    ///
    /// The future is spawned on the ambient tokio runtime when the task
    /// dispatches and its outcome is forwarded through the continuation.
    /// Dispatching outside a runtime context fails the task with
    /// [`TandemError::NoRuntime`].
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Values, TaskError>> + Send + 'static,
    {
        let fut = fut.boxed();
        Self::plain(move |_values, cont| match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match fut.await {
                        Ok(values) => cont.resume(values),
                        Err(error) => cont.fail(error),
                    }
                });
            }
            Err(_) => cont.fail(TaskError::new(TandemError::NoRuntime)),
        })
    }

    /// Attach a label used in logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Label used in diagnostics: the explicit name, or the id.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    pub(crate) fn step_count(&self) -> Option<usize> {
        match &self.body {
            TaskBody::Steps(steps) => Some(steps.len()),
            TaskBody::Plain(_) => None,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.body {
            TaskBody::Plain(_) => "plain".to_string(),
            TaskBody::Steps(steps) => format!("steps({})", steps.len()),
        };
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn labels_prefer_names() {
        let task = Task::plain(|_, cont| cont.resume(Values::new()));
        assert_eq!(task.label(), task.id().to_string());
        let task = task.named("fetch");
        assert_eq!(task.label(), "fetch");
    }

    #[test]
    fn step_tasks_report_their_points() {
        let task = Task::steps(vec![
            Step::new(|_, cont| cont.resume(Values::new())),
            Step::new(|_, cont| cont.resume(Values::new())),
        ]);
        assert_eq!(task.step_count(), Some(2));
        assert!(format!("{task:?}").contains("steps(2)"));

        let task = Task::plain(|_, cont| cont.resume(Values::new()));
        assert_eq!(task.step_count(), None);
    }
}
