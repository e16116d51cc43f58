use std::sync::{
	atomic::{AtomicBool, AtomicU8, Ordering},
	Arc, Mutex,
};

use crate::{
	event::{EventHub, TaskEvent},
	task::TaskId,
};

/// Thread-safe state shared between a running job and its record.
///
/// This is the only place a worker thread ever writes: the registry proper is
/// mutated exclusively by the manager under its own lock. The manager reads
/// the latest values from here when the UI polls.
#[derive(Debug)]
pub(crate) struct ProgressChannel {
	percent: AtomicU8,
	status: Mutex<String>,
	cancel_requested: AtomicBool,
}

impl ProgressChannel {
	pub(crate) fn new() -> Self {
		Self {
			percent: AtomicU8::new(0),
			status: Mutex::new(String::new()),
			cancel_requested: AtomicBool::new(false),
		}
	}

	pub(crate) fn percent(&self) -> u8 {
		self.percent.load(Ordering::Acquire)
	}

	/// Stores a new percent, reporting whether the observed value changed.
	pub(crate) fn store_percent(&self, percent: u8) -> bool {
		self.percent.swap(percent, Ordering::AcqRel) != percent
	}

	pub(crate) fn status(&self) -> String {
		self.status
			.lock()
			.expect("progress status lock poisoned")
			.clone()
	}

	/// Stores a new status text, reporting whether it changed.
	pub(crate) fn store_status(&self, status: &str) -> bool {
		let mut current = self.status.lock().expect("progress status lock poisoned");

		if *current == status {
			false
		} else {
			status.clone_into(&mut current);
			true
		}
	}

	/// Flips the cancellation flag, reporting whether this call was the
	/// false→true transition.
	pub(crate) fn request_cancel(&self) -> bool {
		!self.cancel_requested.swap(true, Ordering::AcqRel)
	}

	pub(crate) fn is_cancel_requested(&self) -> bool {
		self.cancel_requested.load(Ordering::Acquire)
	}
}

/// The capability handed to a running job for reporting progress and polling
/// cancellation.
///
/// A `TaskProgress` is write-only for percent/status and read-only for the
/// cancellation flag; it never exposes the task's record, so a job cannot
/// mutate manager state outside the progress contract.
///
/// # Sub-phase budgeting
///
/// A long operation with sub-phases carves its 0–100 scale into windows with
/// [`portion`](Self::portion): each window presents a fresh 0–100 to nested
/// code and remaps reports linearly, so nested steps never need to know their
/// caller's total scale.
///
/// ```
/// use chamfer_task_manager::{TaskManager, TaskProgress};
///
/// let manager = TaskManager::new();
/// let id = manager.new_task(|progress: &TaskProgress| {
///     let parse = progress.portion(0, 20);
///     parse.set_percent(100); // observed: 20
///
///     let mesh = progress.portion(20, 60);
///     mesh.set_percent(50); // observed: 40
/// });
/// manager.exec(id);
/// assert_eq!(manager.progress(id), Some(40));
/// ```
#[derive(Debug)]
pub struct TaskProgress {
	id: TaskId,
	channel: Arc<ProgressChannel>,
	hub: Arc<EventHub>,
	from: u8,
	to: u8,
}

impl TaskProgress {
	pub(crate) fn new(id: TaskId, channel: Arc<ProgressChannel>, hub: Arc<EventHub>) -> Self {
		Self {
			id,
			channel,
			hub,
			from: 0,
			to: 100,
		}
	}

	/// Id of the task this handle reports for.
	#[must_use]
	pub const fn task_id(&self) -> TaskId {
		self.id
	}

	/// Reports progress within this handle's window.
	///
	/// The input is clamped to `[0, 100]` before being remapped, so jobs can
	/// feed raw ratios without worrying about overshoot. Publishes a
	/// [`TaskEvent::ProgressChanged`] only when the observed whole-task
	/// percent actually changes.
	pub fn set_percent(&self, percent: i32) {
		let observed = self.map(clamp_percent(percent));

		if self.channel.store_percent(observed) {
			self.hub.publish(&TaskEvent::ProgressChanged {
				id: self.id,
				percent: observed,
			});
		}
	}

	/// Last observed whole-task percent.
	#[must_use]
	pub fn percent(&self) -> u8 {
		self.channel.percent()
	}

	/// Reports a human-readable phase description, independent of percent.
	pub fn set_status(&self, status: impl Into<String>) {
		let status = status.into();

		if self.channel.store_status(&status) {
			self.hub.publish(&TaskEvent::StatusChanged {
				id: self.id,
				status,
			});
		}
	}

	/// Last reported status text.
	#[must_use]
	pub fn status(&self) -> String {
		self.channel.status()
	}

	/// Non-blocking read of the cancellation flag.
	///
	/// Jobs are expected to poll this between units of work and unwind early
	/// when it turns true; how often they poll is what bounds cancellation
	/// latency.
	#[must_use]
	pub fn is_cancel_requested(&self) -> bool {
		self.channel.is_cancel_requested()
	}

	/// Carves the window `[from, to]` (on this handle's 0–100 scale) into a
	/// child handle presenting a fresh 0–100 to nested code.
	///
	/// Bounds are clamped to `[0, 100]` and reordered if reversed. Portions
	/// nest: a portion of a portion maps through both windows.
	#[must_use]
	pub fn portion(&self, from: i32, to: i32) -> Self {
		let a = clamp_percent(from);
		let b = clamp_percent(to);
		let (from, to) = if a <= b { (a, b) } else { (b, a) };

		Self {
			id: self.id,
			channel: Arc::clone(&self.channel),
			hub: Arc::clone(&self.hub),
			from: self.map(from),
			to: self.map(to),
		}
	}

	#[allow(clippy::cast_possible_truncation)] // result is provably <= 100
	fn map(&self, local: u8) -> u8 {
		let span = u32::from(self.to - self.from);

		self.from + (span * u32::from(local) / 100) as u8
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_percent(percent: i32) -> u8 {
	percent.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
	use super::*;

	fn root_progress() -> TaskProgress {
		TaskProgress::new(
			TaskId::new(1),
			Arc::new(ProgressChannel::new()),
			Arc::new(EventHub::default()),
		)
	}

	#[test]
	fn out_of_range_input_is_clamped() {
		let progress = root_progress();

		progress.set_percent(250);
		assert_eq!(progress.percent(), 100);

		progress.set_percent(-40);
		assert_eq!(progress.percent(), 0);
	}

	#[test]
	fn portion_remaps_linearly() {
		let progress = root_progress();
		let mesh = progress.portion(20, 60);

		mesh.set_percent(0);
		assert_eq!(progress.percent(), 20);

		mesh.set_percent(50);
		assert_eq!(progress.percent(), 40);

		mesh.set_percent(100);
		assert_eq!(progress.percent(), 60);
	}

	#[test]
	fn portions_nest() {
		let progress = root_progress();
		let write = progress.portion(60, 100);
		let compress = write.portion(0, 50);

		compress.set_percent(100);
		assert_eq!(progress.percent(), 80);
	}

	#[test]
	fn reversed_or_overshooting_portion_bounds_are_normalized() {
		let progress = root_progress();
		let phase = progress.portion(110, 50);

		phase.set_percent(0);
		assert_eq!(progress.percent(), 50);

		phase.set_percent(100);
		assert_eq!(progress.percent(), 100);
	}

	#[test]
	fn duplicate_percent_is_not_a_change() {
		let channel = ProgressChannel::new();

		assert!(channel.store_percent(10));
		assert!(!channel.store_percent(10));
		assert!(channel.store_percent(11));
	}

	#[test]
	fn cancel_flag_only_transitions_once() {
		let channel = ProgressChannel::new();

		assert!(!channel.is_cancel_requested());
		assert!(channel.request_cancel());
		assert!(!channel.request_cancel());
		assert!(channel.is_cancel_requested());
	}
}
