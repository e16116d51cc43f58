use thiserror::Error;

use super::task::TaskId;

/// Unknown-id operations are deliberately silent no-ops (they arise from
/// benign races between the UI and task completion), so the only fallible
/// public operation is the bounded wait.
#[derive(Debug, Error)]
pub enum Error {
	#[error("timed out waiting for task <id='{0}'> to end")]
	WaitTimeout(TaskId),
}
