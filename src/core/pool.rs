//! Fixed-size worker pool over an unbounded task queue.
//!
//! Submission never blocks; under overload the queue grows and the caller's
//! own pacing (the per-target in-flight flag) keeps duplicates out.

use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinHandle;

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct WorkerPool {
    queue: flume::Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers, each draining the shared queue one task at a
    /// time.
    pub fn new(size: usize) -> Self {
        let (queue, rx) = flume::unbounded::<Task>();
        let workers = (0..size)
            .map(|_| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    while let Ok(task) = rx.recv_async().await {
                        task.await;
                    }
                })
            })
            .collect();
        Self { queue, workers }
    }

    /// Queue a task without blocking. Returns `false` once the pool has
    /// shut down.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queue.send(Box::pin(task)).is_ok()
    }

    /// Tasks queued but not yet picked up by a worker.
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    /// Close the queue and wait for the workers to drain what remains.
    pub async fn shutdown(self) {
        drop(self.queue);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
