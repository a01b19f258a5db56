/// Delivery of loader notifications on the UI thread.
///
/// The worker never calls observers itself. It hands small jobs to a
/// `UiDispatcher`, which runs them later on whatever thread owns the UI.
/// `UiQueue` is a ready-made dispatcher for hosts that drive their own loop.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use super::damage::Rect;
use super::levels::LoadLevels;
use crate::error::LoadError;

/// A unit of work that must run on the UI thread
pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget scheduling onto the UI thread
pub trait UiDispatcher: Send + Sync {
    fn schedule(&self, job: UiJob);
}

/// Any `Fn(UiJob)` closure is a dispatcher, e.g. one forwarding to a
/// toolkit's idle queue or an event-loop proxy.
impl<F> UiDispatcher for F
where
    F: Fn(UiJob) + Send + Sync,
{
    fn schedule(&self, job: UiJob) {
        self(job)
    }
}

/// Notifications a loader delivers to its observers
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// A new buffer for `level` is available
    AreaPrepared(LoadLevels),
    /// Pixels inside `area` of the `level` buffer changed
    AreaUpdated { level: LoadLevels, area: Rect },
    /// `level` is complete
    Completed(LoadLevels),
    /// The worker gave up on this run
    Failed(Arc<LoadError>),
}

/// Observer callback, always invoked on the UI thread
pub type Listener = Arc<dyn Fn(&LoaderEvent) + Send + Sync>;

/// Single-consumer job queue standing in for a UI event loop.
pub struct UiQueue {
    tx: Sender<UiJob>,
    rx: Receiver<UiJob>,
}

struct QueueDispatcher {
    tx: Sender<UiJob>,
}

impl UiDispatcher for QueueDispatcher {
    fn schedule(&self, job: UiJob) {
        // The queue owner went away; nobody is left to notify
        if self.tx.send(job).is_err() {
            log::trace!("UI queue closed, dropping job");
        }
    }
}

impl UiQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Dispatcher feeding this queue, to hand to loaders
    pub fn dispatcher(&self) -> Arc<dyn UiDispatcher> {
        Arc::new(QueueDispatcher { tx: self.tx.clone() })
    }

    /// Run every job queued so far on the calling thread. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for one job and run it. Returns false on timeout.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Number of jobs waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for UiQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread;

    #[test]
    fn test_jobs_run_in_order_on_draining_thread() {
        let queue = UiQueue::new();
        let dispatcher = queue.dispatcher();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let worker = {
            let seen = seen.clone();
            thread::spawn(move || {
                for i in 0..3 {
                    let seen = seen.clone();
                    dispatcher.schedule(Box::new(move || {
                        seen.lock().push((i, thread::current().id()));
                    }));
                }
            })
        };
        worker.join().unwrap();

        assert_eq!(queue.len(), 3);
        assert!(seen.lock().is_empty());
        assert_eq!(queue.run_pending(), 3);

        let me = thread::current().id();
        let seen = seen.lock();
        assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(seen.iter().all(|(_, id)| *id == me));
    }

    #[test]
    fn test_run_next_times_out_when_idle() {
        let queue = UiQueue::new();
        assert!(!queue.run_next(Duration::from_millis(10)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_closure_dispatcher_runs_inline() {
        let hits = Arc::new(Mutex::new(0));
        let dispatcher: Arc<dyn UiDispatcher> = Arc::new(|job: UiJob| job());

        let counter = hits.clone();
        dispatcher.schedule(Box::new(move || *counter.lock() += 1));
        assert_eq!(*hits.lock(), 1);
    }
}
