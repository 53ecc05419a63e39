//! Tandem - callback-style control flow for asynchronous tasks
//!
//! Tandem runs an ordered collection of tasks either strictly in order
//! ([`series`], threading the values of each task's resumption into the
//! next) or concurrently ([`parallel`], fanning out and collecting a single
//! completion signal). It targets code that composes callback-shaped
//! asynchronous work rather than futures, though futures can be bridged in
//! with [`Task::future`].
//!
//! # Overview
//!
//! - A [`Task`] is either *plain* (one closure that eventually invokes its
//!   [`Continuation`] once) or *stepped* (an ordered sequence of suspension
//!   points, each resumed by its own continuation).
//! - Executors never advance a run synchronously inside a continuation
//!   invocation; resumptions cross a deferred [`Schedule`] boundary, so stack
//!   depth stays bounded no matter how long the list is or how synchronously
//!   tasks complete.
//! - A run's completion continuation fires exactly once, with the first
//!   reported error or with the success outcome.
//! - Nested composition is free: [`Task::series`] and [`Task::parallel`] wrap
//!   whole sub-runs as single tasks, and any [`Task`] converts into a
//!   [`Step`].
//!
//! # Example
//!
//! ```
//! use tandem::Task;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, rx) = tokio::sync::oneshot::channel();
//!     tandem::series(
//!         vec![
//!             Task::plain(|_, cont| cont.resume_with("fetched")),
//!             Task::plain(|prev, cont| {
//!                 let input = prev[0].downcast_ref::<&str>().copied().unwrap_or_default();
//!                 cont.resume_with(format!("{input}+parsed"));
//!             }),
//!         ],
//!         move |error, values| {
//!             assert!(error.is_none());
//!             let _ = tx.send(values);
//!         },
//!     )
//!     .unwrap();
//!     let values = rx.await.unwrap();
//!     assert_eq!(
//!         values[0].downcast_ref::<String>().map(String::as_str),
//!         Some("fetched+parsed")
//!     );
//! }
//! ```

pub mod continuation;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod task;
pub mod types;

pub use continuation::Continuation;
pub use error::{TandemError, TandemResult, TaskError};
pub use executor::{Completion, Executor};
pub use scheduler::{Job, QueueScheduler, Schedule, TokioScheduler};
pub use task::{Step, Task, TaskId};
pub use types::{Value, Values};

/// Run a single task on the ambient tokio runtime; equivalent to a
/// one-element [`series`].
pub fn run<F>(task: Task, completion: F) -> TandemResult<()>
where
    F: FnOnce(Option<TaskError>, Values) + Send + 'static,
{
    Executor::new()?.run(task, Some(Completion::new(completion)))
}

/// Run `tasks` strictly in list order on the ambient tokio runtime,
/// threading values and short-circuiting on the first error.
///
/// See [`Executor::series`] for the full contract and for running without a
/// completion or with a custom scheduler.
pub fn series<F>(tasks: Vec<Task>, completion: F) -> TandemResult<()>
where
    F: FnOnce(Option<TaskError>, Values) + Send + 'static,
{
    Executor::new()?.series(tasks, Some(Completion::new(completion)))
}

/// Dispatch every task at once on the ambient tokio runtime and signal
/// completion exactly once.
///
/// See [`Executor::parallel`] for the full contract.
pub fn parallel<F>(tasks: Vec<Task>, completion: F) -> TandemResult<()>
where
    F: FnOnce(Option<TaskError>, Values) + Send + 'static,
{
    Executor::new()?.parallel(tasks, Some(Completion::new(completion)))
}
