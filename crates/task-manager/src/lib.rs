//!
//! # Chamfer Task Manager
//!
//! The background task subsystem of the Chamfer CAD viewer: a process-wide
//! registry of asynchronous, cancellable units of work, each identified by an
//! opaque id, each reporting fractional progress and textual status, each
//! running off the UI thread while staying observable and controllable from
//! it.
//!
//! Import, export and meshing commands hand the manager a job closure and get
//! an id back; the job runs to completion on its own dedicated worker thread,
//! periodically pushing percent/status into its progress handle and polling
//! for cooperative cancellation. Progress dialogs and taskbar integrations
//! subscribe to the manager's event queues and drain them on their own
//! thread, so nothing ever mutates UI state cross-thread. Niceties:
//! - Thread-per-task execution for few, long-lived jobs (file import/export,
//!   meshing), with none of the scheduling calls ever blocking the caller;
//! - Cooperative cancellation via a polled flag, never forced termination;
//! - Sub-phase percent budgeting, so nested operations report 0–100 without
//!   knowing their caller's scale;
//! - Panic containment: a crashing job still ends its record and surfaces a
//!   failure notification instead of leaving a stuck progress bar.
//!
//! ## Basic example
//!
//! ```
//! use chamfer_task_manager::{TaskEvent, TaskManager, TaskProgress, TaskState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = TaskManager::new();
//!     let events = manager.subscribe();
//!
//!     let id = manager.new_task(|progress: &TaskProgress| {
//!         progress.set_status("Reading geometry");
//!         for percent in [25, 50, 75, 100] {
//!             if progress.is_cancel_requested() {
//!                 return;
//!             }
//!             progress.set_percent(percent);
//!         }
//!     });
//!
//!     manager.set_title(id, "Import assembly.step");
//!     manager.run(id);
//!     manager.wait_for_done(id).await;
//!
//!     assert_eq!(manager.state(id), Some(TaskState::Ended));
//!     assert_eq!(manager.progress(id), Some(100));
//!     assert_eq!(events.try_recv(), Some(TaskEvent::Added(id)));
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod error;
mod event;
mod manager;
mod progress;
mod task;

pub use error::Error;
pub use event::{TaskEvent, TaskEventReceiver};
pub use manager::TaskManager;
pub use progress::TaskProgress;
pub use task::{TaskId, TaskJob, TaskState};
