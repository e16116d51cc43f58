use std::fmt;

use crate::progress::TaskProgress;

/// A unique identifier for a task, allocated sequentially by its owning
/// [`TaskManager`](crate::TaskManager).
///
/// Ids are never reused while the task's record is alive, and their natural
/// ordering is creation order, which is what progress dialogs want for
/// display. Other than that, treat them as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
	pub(crate) const fn new(value: u64) -> Self {
		Self(value)
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Lifecycle state of a task record.
///
/// `Ended` subsumes success, failure and cancellation: the manager only knows
/// the job returned. Jobs report their own domain failures through whatever
/// messaging collaborator they carry, before returning.
///
/// Transitions only move forward: `Pending → Running → Ended`. A record can
/// never leave `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
	Pending,
	Running,
	Ended,
}

/// A unit of background work that can be registered with a
/// [`TaskManager`](crate::TaskManager).
///
/// The job receives a [`TaskProgress`] handle to report percent/status and to
/// poll for cooperative cancellation; everything else it produces travels via
/// side effects on the caller's own collaborators (writing into a document,
/// invoking a messenger). Jobs run off the UI thread and may block for as
/// long as they like.
///
/// Any `FnOnce(&TaskProgress) + Send + 'static` closure is a job:
///
/// ```
/// use chamfer_task_manager::{TaskManager, TaskProgress};
///
/// let manager = TaskManager::new();
/// let id = manager.new_task(|progress: &TaskProgress| {
///     progress.set_status("Reading file");
///     progress.set_percent(100);
/// });
/// manager.exec(id);
/// assert_eq!(manager.progress(id), Some(100));
/// ```
pub trait TaskJob: Send {
	/// Performs the work, consuming the job.
	fn run(self: Box<Self>, progress: &TaskProgress);
}

/// Blanket implementation so plain closures can be submitted directly.
impl<F> TaskJob for F
where
	F: FnOnce(&TaskProgress) + Send + 'static,
{
	fn run(self: Box<Self>, progress: &TaskProgress) {
		(*self)(progress);
	}
}
