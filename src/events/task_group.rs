use std::future::Future;

use anyhow::{Result, anyhow};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Structured group of tasks.
///
/// [`TaskGroup::join`] waits for every task. The first failure cancels the
/// group token, aborts the remaining tasks and is returned.
#[derive(Debug, Default)]
pub struct TaskGroup {
    tasks: JoinSet<Result<()>>,
    cancel: CancellationToken,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group cancelled together with `parent`
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel: parent.child_token(),
        }
    }

    /// Cancel scope shared by the tasks of this group
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancels the scope; tasks are expected to wind down on their own
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for all tasks, returning the first failure
    pub async fn join(mut self) -> Result<()> {
        let mut failure = None;

        while let Some(joined) = self.tasks.join_next().await {
            let error = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => anyhow!("Task panicked: {e}"),
            };

            if failure.is_none() {
                log::debug!("Task failed, cancelling group: {error:?}");
                self.cancel.cancel();
                self.tasks.abort_all();
                failure = Some(error);
            } else {
                log::debug!("Further task failure ignored: {error:?}");
            }
        }

        failure.map_or(Ok(()), Err)
    }
}
