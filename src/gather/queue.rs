//! Bounded worker pool for gather and inspect work

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{GatherError, Result};

/// A unit of work executed by a queue worker.
pub type WorkFuture = BoxFuture<'static, Result<()>>;

/// A bounded pool of workers draining a single channel of work futures.
///
/// The first error returned by any work future is latched and surfaced by
/// [`WorkQueue::wait`]; later errors are dropped. Work futures that want
/// their failures recorded must return them instead of only logging.
pub struct WorkQueue {
    workers: usize,
    tx: Mutex<Option<mpsc::Sender<WorkFuture>>>,
    rx: Mutex<Option<mpsc::Receiver<WorkFuture>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    first_error: Arc<Mutex<Option<GatherError>>>,
}

impl WorkQueue {
    pub fn new(workers: usize) -> Self {
        let (tx, rx) = mpsc::channel(workers);

        Self {
            workers,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            handles: Mutex::new(Vec::new()),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Submit work to the queue. Blocks when the channel buffer is full.
    /// Fails with [`GatherError::ClosedQueue`] after [`WorkQueue::close`].
    pub async fn queue(&self, work: WorkFuture) -> Result<()> {
        // Clone the sender out of the lock; sending must not hold it.
        let tx = match &*self.tx.lock().expect("queue lock poisoned") {
            Some(tx) => tx.clone(),
            None => return Err(GatherError::ClosedQueue),
        };

        tx.send(work).await.map_err(|_| GatherError::ClosedQueue)
    }

    /// Spawn the workers. Must be called exactly once, before any call to
    /// [`WorkQueue::wait`].
    pub fn start(&self) {
        let rx = self
            .rx
            .lock()
            .expect("queue lock poisoned")
            .take()
            .expect("queue already started");
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut handles = self.handles.lock().expect("queue lock poisoned");
        for _ in 0..self.workers {
            let rx = rx.clone();
            let first_error = self.first_error.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // Hold the receiver lock only while waiting for work, so
                    // the other workers can pick up the next item.
                    let work = { rx.lock().await.recv().await };
                    match work {
                        Some(work) => {
                            if let Err(err) = work.await {
                                set_first_error(&first_error, err);
                            }
                        }
                        None => break,
                    }
                }
            }));
        }
    }

    /// Close the submission side. Idempotent; queued work is still drained.
    pub fn close(&self) {
        self.tx.lock().expect("queue lock poisoned").take();
    }

    /// Wait until all workers have drained and exited, returning the first
    /// error observed, if any.
    pub async fn wait(&self) -> Option<GatherError> {
        let handles = std::mem::take(&mut *self.handles.lock().expect("queue lock poisoned"));
        for handle in handles {
            let _ = handle.await;
        }

        self.first_error.lock().expect("queue lock poisoned").take()
    }
}

fn set_first_error(slot: &Mutex<Option<GatherError>>, err: GatherError) {
    let mut slot = slot.lock().expect("queue lock poisoned");
    if slot.is_none() {
        *slot = Some(err);
    }
}
