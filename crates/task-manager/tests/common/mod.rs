use std::{thread, time::Duration};

use async_channel as chan;
use chamfer_task_manager::{TaskJob, TaskProgress};
use tracing::info;

/// Job reporting the given percents in order, then returning.
pub struct StepsJob {
	percents: Vec<i32>,
}

impl StepsJob {
	pub fn new(percents: impl IntoIterator<Item = i32>) -> Self {
		Self {
			percents: percents.into_iter().collect(),
		}
	}
}

impl TaskJob for StepsJob {
	fn run(self: Box<Self>, progress: &TaskProgress) {
		for percent in self.percents {
			progress.set_percent(percent);
		}
	}
}

/// Job that reports one percent, signals that it began and then parks until
/// its gate is released (or dropped).
pub struct GatedJob {
	percent: i32,
	began_tx: chan::Sender<()>,
	gate_rx: chan::Receiver<()>,
}

impl GatedJob {
	pub fn new(percent: i32) -> (Self, chan::Receiver<()>, chan::Sender<()>) {
		let (began_tx, began_rx) = chan::bounded(1);
		let (gate_tx, gate_rx) = chan::bounded(1);

		(
			Self {
				percent,
				began_tx,
				gate_rx,
			},
			began_rx,
			gate_tx,
		)
	}
}

impl TaskJob for GatedJob {
	fn run(self: Box<Self>, progress: &TaskProgress) {
		progress.set_percent(self.percent);

		self.began_tx
			.send_blocking(())
			.expect("began channel closed");

		// Both an explicit release and the test dropping its sender open
		// the gate.
		let _ = self.gate_rx.recv_blocking();

		info!("gate opened, job returning");
	}
}

/// Job that checks the cancellation flag once at its first checkpoint and
/// returns before reporting anything when it is already set.
pub struct CancelAtStartJob;

impl TaskJob for CancelAtStartJob {
	fn run(self: Box<Self>, progress: &TaskProgress) {
		if progress.is_cancel_requested() {
			info!("canceled before doing any work");
			return;
		}

		progress.set_percent(100);
	}
}

/// Job that spins at its checkpoints until cancellation is requested.
pub struct SpinUntilCanceledJob {
	began_tx: chan::Sender<()>,
}

impl SpinUntilCanceledJob {
	pub fn new() -> (Self, chan::Receiver<()>) {
		let (began_tx, began_rx) = chan::bounded(1);

		(Self { began_tx }, began_rx)
	}
}

impl TaskJob for SpinUntilCanceledJob {
	fn run(self: Box<Self>, progress: &TaskProgress) {
		progress.set_percent(10);

		self.began_tx
			.send_blocking(())
			.expect("began channel closed");

		while !progress.is_cancel_requested() {
			thread::sleep(Duration::from_millis(2));
		}

		info!("observed cancellation request, unwinding early");
	}
}

/// Job that dies instead of returning.
pub struct ExplodingJob;

impl TaskJob for ExplodingJob {
	fn run(self: Box<Self>, _progress: &TaskProgress) {
		panic!("STEP file is malformed");
	}
}
