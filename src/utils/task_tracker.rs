use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Tracks named background tasks so they can be cancelled as a group.
/// Spawning a task under a name already in use aborts the previous one.
#[derive(Clone, Default)]
pub struct TaskTracker {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn spawn(&self, name: impl Into<String>, handle: JoinHandle<()>) {
        let name = name.into();
        let mut tasks = self.tasks.lock().await;
        if let Some(old) = tasks.insert(name.clone(), handle) {
            old.abort();
        }
    }

    /// Spawns `future` on the Tokio runtime and registers it under `name`;
    /// the registration is removed once the future completes.
    pub async fn spawn_auto_cleanup<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let tasks = self.tasks.clone();
        let cleanup_name = name.clone();
        let handle = tokio::spawn(async move {
            future.await;
            tasks.lock().await.remove(&cleanup_name);
        });
        self.spawn(name, handle).await;
    }

    pub async fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().await;
        let count = tasks.len();
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
        debug!(count, "cancelled tracked tasks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn replacing_a_named_task_aborts_the_old_one() {
        let tracker = TaskTracker::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        let h1 = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });
        tracker.spawn("job", h1).await;

        let ran_clone = ran.clone();
        let h2 = tokio::spawn(async move {
            ran_clone.fetch_add(10, Ordering::SeqCst);
        });
        tracker.spawn("job", h2).await;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn cancel_all_aborts_every_tracked_task() {
        let tracker = TaskTracker::new();
        let h = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        });
        tracker.spawn("long", h).await;
        tracker.cancel_all().await;
        assert!(tracker.tasks.lock().await.is_empty());
    }
}
