//! Work that runs after the response has been sent
//!
//! Handlers enqueue futures on the request's [`DeferredQueue`]; the
//! `drain_deferred` middleware spawns them once the response is ready.

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub type DeferredTask = BoxFuture<'static, ()>;

/// FIFO of deferred tasks
#[derive(Clone, Default)]
pub struct DeferredQueue {
    tasks: Arc<Mutex<VecDeque<DeferredTask>>>,
}

impl std::fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredQueue").finish_non_exhaustive()
    }
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().await.push_back(Box::pin(task));
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Take every queued task in submission order
    pub async fn take(&self) -> Vec<DeferredTask> {
        self.tasks.lock().await.drain(..).collect()
    }

    /// Run every queued task to completion, in submission order
    pub async fn drain(&self) -> usize {
        let tasks = self.take().await;
        let count = tasks.len();
        for task in tasks {
            task.await;
        }
        count
    }

    /// Run the queued tasks on the runtime without waiting for them
    pub async fn spawn_drain(&self) {
        let tasks = self.take().await;
        if tasks.is_empty() {
            return;
        }
        debug!(count = tasks.len(), "Running deferred tasks");
        tokio::spawn(async move {
            for task in tasks {
                task.await;
            }
        });
    }
}
