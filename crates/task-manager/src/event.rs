use std::sync::Mutex;

use async_channel as chan;

use crate::task::TaskId;

/// Lifecycle notifications published by a [`TaskManager`](crate::TaskManager).
///
/// Events are produced on whichever thread caused them (the caller's thread
/// for `Added`/`Started`/`TitleChanged`, the worker thread for progress and
/// termination events) and delivered through per-observer queues, so an
/// observer always drains them on its own thread at its own pace. Events for
/// a given task arrive in production order; there is no ordering between
/// different tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
	/// A new `Pending` record was registered.
	Added(TaskId),
	/// The record's display title changed.
	TitleChanged { id: TaskId, title: String },
	/// The job was scheduled and the record moved to `Running`.
	Started(TaskId),
	/// The observed whole-task percent changed.
	ProgressChanged { id: TaskId, percent: u8 },
	/// The job reported a new status/phase description.
	StatusChanged { id: TaskId, status: String },
	/// Cancellation was requested; the job will stop at its next checkpoint.
	CancelRequested(TaskId),
	/// The job panicked instead of returning. Always followed by `Ended`.
	Failed { id: TaskId, message: String },
	/// The job returned and the record moved to `Ended`.
	Ended(TaskId),
	/// The record was removed from the registry.
	Removed(TaskId),
}

impl TaskEvent {
	/// The task this event is about.
	#[must_use]
	pub const fn task_id(&self) -> TaskId {
		match self {
			Self::Added(id)
			| Self::Started(id)
			| Self::CancelRequested(id)
			| Self::Ended(id)
			| Self::Removed(id)
			| Self::TitleChanged { id, .. }
			| Self::ProgressChanged { id, .. }
			| Self::StatusChanged { id, .. }
			| Self::Failed { id, .. } => *id,
		}
	}
}

/// Receiving end of one observer's event queue, created by
/// [`TaskManager::subscribe`](crate::TaskManager::subscribe).
///
/// The queue is unbounded, so publishers never block on a slow observer. A
/// UI drains it once per tick with [`try_recv`](Self::try_recv); async
/// consumers await [`recv`](Self::recv). Dropping the receiver
/// unsubscribes.
#[derive(Debug)]
pub struct TaskEventReceiver {
	rx: chan::Receiver<TaskEvent>,
}

impl TaskEventReceiver {
	/// Awaits the next event, or `None` once the manager is gone.
	pub async fn recv(&self) -> Option<TaskEvent> {
		self.rx.recv().await.ok()
	}

	/// Blocks the calling thread until the next event.
	#[must_use]
	pub fn recv_blocking(&self) -> Option<TaskEvent> {
		self.rx.recv_blocking().ok()
	}

	/// Returns the next already-queued event, if any, without waiting.
	#[must_use]
	pub fn try_recv(&self) -> Option<TaskEvent> {
		self.rx.try_recv().ok()
	}

	/// Number of events currently queued.
	#[must_use]
	pub fn len(&self) -> usize {
		self.rx.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.rx.is_empty()
	}
}

/// Fan-out point between event producers and observer queues.
///
/// Publishing while holding the subscriber lock keeps every observer's queue
/// in the same global order, which is what gives per-task delivery ordering
/// even when the producer is a worker thread.
#[derive(Debug, Default)]
pub(crate) struct EventHub {
	subscribers: Mutex<Vec<chan::Sender<TaskEvent>>>,
}

impl EventHub {
	pub(crate) fn subscribe(&self) -> TaskEventReceiver {
		let (tx, rx) = chan::unbounded();

		self.subscribers
			.lock()
			.expect("event hub lock poisoned")
			.push(tx);

		TaskEventReceiver { rx }
	}

	pub(crate) fn publish(&self, event: &TaskEvent) {
		// try_send on an unbounded queue only fails when the receiver is
		// gone, which doubles as unsubscription.
		self.subscribers
			.lock()
			.expect("event hub lock poisoned")
			.retain(|tx| tx.try_send(event.clone()).is_ok());
	}
}
