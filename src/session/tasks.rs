//! Tracked background work and the deferred-task queue.
//!
//! Every timer and worker is spawned through [`Tasks`] so it can be listed
//! (`show_timers`, `show_threads`), reaped once finished, and aborted on
//! shutdown or restart. Workers poll [`Tasks::is_running`] each cycle.

use super::Services;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// One-shot, fires after a delay.
    Timer,
    /// Long-running loop.
    Worker,
}

#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub kind: TaskKind,
    pub started_at: i64,
    pub finished: bool,
}

struct Tracked {
    name: String,
    kind: TaskKind,
    started_at: i64,
    handle: JoinHandle<()>,
}

pub struct Tasks {
    tracked: Mutex<Vec<Tracked>>,
    running: AtomicBool,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tracked: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
        }
    }

    /// Shared cancellation flag.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn spawn_worker<F>(&self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.track(name.into(), TaskKind::Worker, tokio::spawn(fut));
    }

    pub fn spawn_timer<F>(&self, name: impl Into<String>, delay: Duration, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        });
        self.track(name.into(), TaskKind::Timer, handle);
    }

    fn track(&self, name: String, kind: TaskKind, handle: JoinHandle<()>) {
        debug!(task = %name, ?kind, "task started");
        self.tracked.lock().push(Tracked {
            name,
            kind,
            started_at: super::now(),
            handle,
        });
    }

    /// Drop finished tasks. Returns how many were reaped.
    pub fn reap(&self) -> usize {
        let mut tracked = self.tracked.lock();
        let before = tracked.len();
        tracked.retain(|t| !t.handle.is_finished());
        before - tracked.len()
    }

    pub fn list(&self, kind: TaskKind) -> Vec<TaskInfo> {
        self.tracked
            .lock()
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| TaskInfo {
                name: t.name.clone(),
                kind: t.kind,
                started_at: t.started_at,
                finished: t.handle.is_finished(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear the running flag and abort everything still tracked.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        let drained: Vec<Tracked> = self.tracked.lock().drain(..).collect();
        for task in drained {
            task.handle.abort();
        }
    }

    /// Allow workers again after a restart.
    pub fn resume(&self) {
        self.running.store(true, Ordering::Relaxed);
    }
}

/// Work queued to run on the next heartbeat.
pub type Deferred = Box<dyn FnOnce(&Arc<Services>) + Send>;

#[derive(Default)]
pub struct DeferredQueue {
    queue: Mutex<VecDeque<(String, Deferred)>>,
}

impl DeferredQueue {
    pub fn push(&self, name: impl Into<String>, task: impl FnOnce(&Arc<Services>) + Send + 'static) {
        self.queue.lock().push_back((name.into(), Box::new(task)));
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<(String, Deferred)> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}
