//! Ordered single-consumer dispatch queue.
//!
//! A [`Dispatcher`] accepts items from any number of producer tasks and
//! hands each one to a single handler, strictly in arrival order, on one
//! dedicated worker task. It decouples the task that receives bytes from
//! the task that interprets protocol semantics: producers never block and
//! the handler never runs on a producer's context.
//!
//! The transport runs two instances, one for raw incoming frames and one
//! for decoded event messages, so event subscriber code can never stall
//! frame classification.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Poll interval while waiting for the queue to drain during shutdown.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Types
// ============================================================================

/// Handler invoked once per dispatched item, on the worker task.
pub type DispatchHandler<T> = Box<dyn Fn(T) + Send + Sync>;

// ============================================================================
// Dispatcher
// ============================================================================

struct DispatcherInner<T> {
    /// Queue writer; taken at shutdown to close the queue.
    sender: Mutex<Option<mpsc::UnboundedSender<T>>>,

    /// Items accepted but not yet fully handled.
    queued: AtomicUsize,

    /// True from construction until shutdown completes.
    dispatching: AtomicBool,

    /// Worker task handle; taken and awaited at shutdown.
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Multi-producer, single-consumer ordered dispatcher.
///
/// Cheaply cloneable; clones share the same queue and worker.
///
/// # Guarantees
///
/// - Items are handled exactly once, in the order they were accepted.
/// - The handler runs only on the dispatcher's worker task, never
///   synchronously on a producer.
/// - [`Dispatcher::shutdown`] drains every item accepted before it was
///   called.
pub struct Dispatcher<T> {
    inner: Arc<DispatcherInner<T>>,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Dispatcher<T> {
    /// Creates a dispatcher and spawns its worker task.
    #[must_use]
    pub fn new(handler: DispatchHandler<T>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        let inner = Arc::new(DispatcherInner {
            sender: Mutex::new(Some(sender)),
            queued: AtomicUsize::new(0),
            dispatching: AtomicBool::new(true),
            worker: Mutex::new(None),
        });

        let worker_inner = Arc::clone(&inner);
        let worker = tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                handler(item);
                worker_inner.queued.fetch_sub(1, Ordering::AcqRel);
            }
        });
        *inner.worker.lock() = Some(worker);

        Self { inner }
    }

    /// Enqueues an item for ordered delivery.
    ///
    /// Returns `false` only if the dispatcher has stopped accepting items.
    /// Never blocks and never invokes the handler synchronously.
    pub fn dispatch(&self, item: T) -> bool {
        let sender = self.inner.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return false;
        };

        self.inner.queued.fetch_add(1, Ordering::AcqRel);
        if sender.send(item).is_ok() {
            true
        } else {
            self.inner.queued.fetch_sub(1, Ordering::AcqRel);
            false
        }
    }

    /// Returns `true` from construction until shutdown completes.
    #[inline]
    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.inner.dispatching.load(Ordering::Acquire)
    }

    /// Drains the queue, closes it to new writes, and stops the worker.
    ///
    /// Waits until every already-accepted item has been handled, then
    /// closes the queue and awaits the worker. After return,
    /// [`Dispatcher::is_dispatching`] reports `false` and
    /// [`Dispatcher::dispatch`] rejects new items.
    pub async fn shutdown(&self) {
        // Let the worker catch up before closing the queue for writes.
        while self.inner.queued.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.inner.sender.lock().take();

        // The worker drains anything that raced in, then exits.
        let worker = self.inner.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        self.inner.dispatching.store(false, Ordering::Release);
        debug!("Dispatcher shut down");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_dispatcher() -> (Dispatcher<u32>, Arc<Mutex<Vec<u32>>>) {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let dispatcher = Dispatcher::new(Box::new(move |item| {
            sink.lock().push(item);
        }));
        (dispatcher, collected)
    }

    #[tokio::test]
    async fn test_items_delivered_in_order() {
        let (dispatcher, collected) = collecting_dispatcher();

        for item in 0..100 {
            assert!(dispatcher.dispatch(item));
        }
        dispatcher.shutdown().await;

        let collected = collected.lock();
        assert_eq!(collected.len(), 100);
        assert_eq!(*collected, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_delivery_is_never_synchronous() {
        let (dispatcher, collected) = collecting_dispatcher();

        // Current-thread runtime: the worker cannot have run before the
        // test task yields, so a synchronous handler call would be visible
        // here.
        assert!(dispatcher.dispatch(1));
        assert!(collected.lock().is_empty());

        dispatcher.shutdown().await;
        assert_eq!(*collected.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_is_rejected() {
        let (dispatcher, collected) = collecting_dispatcher();

        assert!(dispatcher.is_dispatching());
        dispatcher.shutdown().await;

        assert!(!dispatcher.is_dispatching());
        assert!(!dispatcher.dispatch(9));
        assert!(collected.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_drains_pending_items() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let dispatcher = Dispatcher::new(Box::new(move |item: u32| {
            std::thread::sleep(Duration::from_millis(2));
            sink.lock().push(item);
        }));

        for item in 0..25 {
            assert!(dispatcher.dispatch(item));
        }
        dispatcher.shutdown().await;

        assert_eq!(*collected.lock(), (0..25).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_nothing() {
        let (dispatcher, collected) = collecting_dispatcher();

        let mut producers = Vec::new();
        for base in 0..4u32 {
            let dispatcher = dispatcher.clone();
            producers.push(tokio::spawn(async move {
                for offset in 0..50 {
                    assert!(dispatcher.dispatch(base * 50 + offset));
                }
            }));
        }
        for producer in producers {
            producer.await.expect("producer");
        }
        dispatcher.shutdown().await;

        let mut collected = collected.lock().clone();
        collected.sort_unstable();
        assert_eq!(collected, (0..200).collect::<Vec<_>>());
    }
}
