use std::{
	any::Any,
	collections::BTreeMap,
	panic::{self, AssertUnwindSafe},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex, MutexGuard,
	},
	thread,
	time::Duration,
};

use tokio::sync::watch;
use tracing::{error, info_span, instrument, trace, warn};

use crate::{
	error::Error,
	event::{EventHub, TaskEvent, TaskEventReceiver},
	progress::{ProgressChannel, TaskProgress},
	task::{TaskId, TaskJob, TaskState},
};

/// One registered task. Only the manager touches this, under the registry
/// lock; the running job sees nothing but its [`ProgressChannel`] through a
/// [`TaskProgress`] handle.
struct TaskEntry {
	title: String,
	state_tx: watch::Sender<TaskState>,
	channel: Arc<ProgressChannel>,
	job: Option<Box<dyn TaskJob>>,
	worker: Option<thread::JoinHandle<()>>,
}

impl TaskEntry {
	fn state(&self) -> TaskState {
		*self.state_tx.borrow()
	}
}

/// Central authority creating, scheduling, tracking and exposing cancellable
/// background tasks.
///
/// Cloning is cheap and every clone drives the same registry, so a command
/// handler, a progress dialog and a taskbar integration can all hold one.
/// None of the scheduling operations block the calling thread; the jobs
/// themselves each run to completion on their own dedicated worker thread.
///
/// Ended records are retained (late UI reads keep returning last known
/// values) until reclaimed with [`remove`](Self::remove) or
/// [`purge_ended`](Self::purge_ended).
#[derive(Clone, Default)]
pub struct TaskManager {
	inner: Arc<Inner>,
}

struct Inner {
	next_id: AtomicU64,
	registry: Mutex<BTreeMap<TaskId, TaskEntry>>,
	hub: Arc<EventHub>,
}

impl Default for Inner {
	fn default() -> Self {
		Self {
			next_id: AtomicU64::new(1),
			registry: Mutex::new(BTreeMap::new()),
			hub: Arc::new(EventHub::default()),
		}
	}
}

impl TaskManager {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a new `Pending` task and returns its id immediately.
	///
	/// Execution does not start until [`run`](Self::run) or
	/// [`exec`](Self::exec); registering and running are split so callers can
	/// attach a title first and observers can render the record before any
	/// work happens.
	pub fn new_task(&self, job: impl TaskJob + 'static) -> TaskId {
		let id = TaskId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
		let (state_tx, _) = watch::channel(TaskState::Pending);

		self.inner.registry().insert(
			id,
			TaskEntry {
				title: String::new(),
				state_tx,
				channel: Arc::new(ProgressChannel::new()),
				job: Some(Box::new(job)),
				worker: None,
			},
		);

		trace!(%id, "Registered new task");

		self.inner.hub.publish(&TaskEvent::Added(id));

		id
	}

	/// Attaches a display title to the record. No-op on an unknown id.
	pub fn set_title(&self, id: TaskId, title: impl Into<String>) {
		let title = title.into();

		{
			let mut registry = self.inner.registry();

			let Some(entry) = registry.get_mut(&id) else {
				return;
			};

			if entry.title == title {
				return;
			}

			entry.title.clone_from(&title);
		}

		self.inner.hub.publish(&TaskEvent::TitleChanged { id, title });
	}

	/// Moves a `Pending` task to `Running` and executes its job on a
	/// dedicated worker thread.
	///
	/// A task runs at most once: calling this on an unknown, already
	/// `Running` or `Ended` id is a silent no-op, tolerating races between UI
	/// actions and task completion.
	#[instrument(skip_all, fields(task_id = %id))]
	pub fn run(&self, id: TaskId) {
		let Some((job, progress)) = self.inner.prepare_run(id) else {
			return;
		};

		let spawned = thread::Builder::new().name(format!("task-{id}")).spawn({
			let inner = Arc::clone(&self.inner);

			move || {
				let _span = info_span!("task_worker", task_id = %id).entered();

				inner.execute(id, job, &progress);
			}
		});

		match spawned {
			Ok(handle) => {
				if let Some(entry) = self.inner.registry().get_mut(&id) {
					entry.worker = Some(handle);
				}
			}
			Err(e) => {
				error!(?e, "Failed to spawn worker thread; ending task in place");
				self.inner.end_task(id);
			}
		}
	}

	/// Runs a `Pending` task synchronously on the calling thread.
	///
	/// Same lifecycle, events and panic containment as [`run`](Self::run);
	/// returns once the task has ended. Meant for headless callers and tests
	/// that want determinism rather than concurrency.
	#[instrument(skip_all, fields(task_id = %id))]
	pub fn exec(&self, id: TaskId) {
		let Some((job, progress)) = self.inner.prepare_run(id) else {
			return;
		};

		let _span = info_span!("task_worker", task_id = %id).entered();

		self.inner.execute(id, job, &progress);
	}

	/// Requests cooperative cancellation.
	///
	/// Only ever flips the flag false→true; the job decides when to actually
	/// stop, so there is no upper bound on how long that takes. No-op on an
	/// unknown or already `Ended` id.
	pub fn request_cancel(&self, id: TaskId) {
		let flipped = {
			let registry = self.inner.registry();

			match registry.get(&id) {
				Some(entry) if entry.state() != TaskState::Ended => entry.channel.request_cancel(),
				_ => false,
			}
		};

		if flipped {
			trace!(%id, "Cancellation requested");
			self.inner.hub.publish(&TaskEvent::CancelRequested(id));
		}
	}

	/// Current state, or `None` for an unknown (or removed) id.
	#[must_use]
	pub fn state(&self, id: TaskId) -> Option<TaskState> {
		self.inner.registry().get(&id).map(TaskEntry::state)
	}

	/// Last observed percent, or `None` for an unknown id.
	#[must_use]
	pub fn progress(&self, id: TaskId) -> Option<u8> {
		self.inner
			.registry()
			.get(&id)
			.map(|entry| entry.channel.percent())
	}

	/// Display title, or `None` for an unknown id.
	#[must_use]
	pub fn title(&self, id: TaskId) -> Option<String> {
		self.inner
			.registry()
			.get(&id)
			.map(|entry| entry.title.clone())
	}

	/// Last reported status text, or `None` for an unknown id.
	#[must_use]
	pub fn status(&self, id: TaskId) -> Option<String> {
		self.inner
			.registry()
			.get(&id)
			.map(|entry| entry.channel.status())
	}

	/// Mean percent across all live (not yet `Ended`) tasks, or `None` when
	/// there are none. This is the aggregate a taskbar integration renders.
	#[must_use]
	#[allow(clippy::cast_possible_truncation)] // a mean of values <= 100
	pub fn global_progress(&self) -> Option<u8> {
		let registry = self.inner.registry();

		let (sum, count) = registry
			.values()
			.filter(|entry| entry.state() != TaskState::Ended)
			.fold((0u32, 0u32), |(sum, count), entry| {
				(sum + u32::from(entry.channel.percent()), count + 1)
			});

		(count > 0).then(|| (sum / count) as u8)
	}

	/// Ids of all registered tasks, in creation order.
	#[must_use]
	pub fn task_ids(&self) -> Vec<TaskId> {
		self.inner.registry().keys().copied().collect()
	}

	#[must_use]
	pub fn task_count(&self) -> usize {
		self.inner.registry().len()
	}

	/// Registers a new observer queue receiving every subsequent event.
	#[must_use]
	pub fn subscribe(&self) -> TaskEventReceiver {
		self.inner.hub.subscribe()
	}

	/// Waits until the task has ended. Returns immediately for an unknown,
	/// removed or already `Ended` id.
	pub async fn wait_for_done(&self, id: TaskId) {
		let Some(mut state_rx) = self.state_receiver(id) else {
			return;
		};

		// An Err here means the record was removed meanwhile, which counts
		// as done just the same.
		let _ = state_rx
			.wait_for(|state| *state == TaskState::Ended)
			.await;
	}

	/// [`wait_for_done`](Self::wait_for_done) bounded by a timeout.
	///
	/// Needs a tokio runtime for the timer; the unbounded variants do not.
	pub async fn wait_for_done_timeout(&self, id: TaskId, timeout: Duration) -> Result<(), Error> {
		tokio::time::timeout(timeout, self.wait_for_done(id))
			.await
			.map_err(|_| Error::WaitTimeout(id))
	}

	/// Blocking [`wait_for_done`](Self::wait_for_done) for callers without a
	/// runtime. Never call this from the thread that drains an observer
	/// queue if that observer is expected to stay live-updating meanwhile.
	pub fn wait_for_done_blocking(&self, id: TaskId) {
		futures::executor::block_on(self.wait_for_done(id));
	}

	/// Removes a `Pending` or `Ended` record, reporting whether anything was
	/// removed. `Running` records stay until their job returns.
	pub fn remove(&self, id: TaskId) -> bool {
		let removed = {
			let mut registry = self.inner.registry();

			match registry.get(&id) {
				Some(entry) if entry.state() != TaskState::Running => {
					registry.remove(&id).is_some()
				}
				_ => false,
			}
		};

		if removed {
			trace!(%id, "Removed task record");
			self.inner.hub.publish(&TaskEvent::Removed(id));
		}

		removed
	}

	/// Sweeps every `Ended` record, returning how many were removed.
	pub fn purge_ended(&self) -> usize {
		let removed: Vec<TaskId> = {
			let mut registry = self.inner.registry();

			let ended = registry
				.iter()
				.filter(|(_, entry)| entry.state() == TaskState::Ended)
				.map(|(id, _)| *id)
				.collect::<Vec<_>>();

			for id in &ended {
				registry.remove(id);
			}

			ended
		};

		for id in &removed {
			self.inner.hub.publish(&TaskEvent::Removed(*id));
		}

		removed.len()
	}

	/// Blocks until every running worker thread has been joined.
	///
	/// `Pending` tasks are left untouched; call this when the embedding
	/// application shuts down so no worker outlives it.
	#[instrument(skip(self))]
	pub fn shutdown(&self) {
		loop {
			let (handles, running) = {
				let mut registry = self.inner.registry();

				let handles = registry
					.iter_mut()
					.filter_map(|(id, entry)| entry.worker.take().map(|handle| (*id, handle)))
					.collect::<Vec<_>>();

				// Running entries without a worker handle are either mid
				// `exec` on some other thread or between spawn and handle
				// registration; we wait on their state instead of a join.
				let running = registry
					.iter()
					.filter(|(_, entry)| {
						entry.state() == TaskState::Running && entry.worker.is_none()
					})
					.map(|(id, _)| *id)
					.collect::<Vec<_>>();

				(handles, running)
			};

			if handles.is_empty() && running.is_empty() {
				break;
			}

			for (id, handle) in handles {
				if handle.join().is_err() {
					warn!(%id, "Worker thread panicked outside the job wrapper");
				}
			}

			for id in running {
				self.wait_for_done_blocking(id);
			}
		}

		trace!("All worker threads joined");
	}

	fn state_receiver(&self, id: TaskId) -> Option<watch::Receiver<TaskState>> {
		self.inner
			.registry()
			.get(&id)
			.map(|entry| entry.state_tx.subscribe())
	}
}

impl Inner {
	fn registry(&self) -> MutexGuard<'_, BTreeMap<TaskId, TaskEntry>> {
		self.registry.lock().expect("task registry lock poisoned")
	}

	/// Takes the stored job out of a `Pending` record and flips it to
	/// `Running`, publishing `Started`. `None` when the task cannot (or must
	/// not) run.
	fn prepare_run(&self, id: TaskId) -> Option<(Box<dyn TaskJob>, TaskProgress)> {
		let (job, progress) = {
			let mut registry = self.registry();

			let entry = registry.get_mut(&id)?;

			if entry.state() != TaskState::Pending {
				trace!(%id, state = ?entry.state(), "Ignoring run request, task already ran");
				return None;
			}

			let job = entry.job.take()?;

			entry.state_tx.send_replace(TaskState::Running);

			(
				job,
				TaskProgress::new(id, Arc::clone(&entry.channel), Arc::clone(&self.hub)),
			)
		};

		self.hub.publish(&TaskEvent::Started(id));

		Some((job, progress))
	}

	/// Runs the job with panic containment, then marks the record `Ended`.
	///
	/// A panicking job must not leave a permanently "running" record behind,
	/// so the `Failed` notification and the terminal transition both happen
	/// regardless of how the job came back.
	fn execute(&self, id: TaskId, job: Box<dyn TaskJob>, progress: &TaskProgress) {
		trace!("Task job starting");

		if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job.run(progress))) {
			let message = panic_message(payload.as_ref());

			error!(%message, "Task job panicked");

			self.hub.publish(&TaskEvent::Failed { id, message });
		}

		self.end_task(id);
	}

	fn end_task(&self, id: TaskId) {
		{
			let registry = self.registry();

			let Some(entry) = registry.get(&id) else {
				return;
			};

			if entry.state() == TaskState::Ended {
				return;
			}

			entry.state_tx.send_replace(TaskState::Ended);
		}

		trace!(%id, "Task ended");

		self.hub.publish(&TaskEvent::Ended(id));
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	payload.downcast_ref::<&str>().map_or_else(
		|| {
			payload
				.downcast_ref::<String>()
				.cloned()
				.unwrap_or_else(|| "opaque panic payload".to_string())
		},
		|s| (*s).to_string(),
	)
}
