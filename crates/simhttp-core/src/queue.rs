use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, PartialEq, Eq)]
pub enum QueueError {
    Closed,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// An unbounded FIFO shared by the dispatcher and the poll workers.
///
/// Admission is bounded separately through [`WorkQueue::admit`]: new work
/// holds a permit until it is answered, while items put back for another look
/// (`push`) never wait for one. A worker re-queuing can therefore never block
/// on the queue it drains.
pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    ready: Notify,
    permits: Arc<Semaphore>,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Notify::new(),
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Waits for room for one more outstanding item.
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit, QueueError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| QueueError::Closed)
    }

    /// Appends to the tail. Hands the item back once the queue is closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(item);
            }
            inner.items.push_back(item);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Takes the head, waiting while the queue is empty. `None` once closed.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.ready.notified();
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return None;
                }
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.items.pop_front()
    }

    /// Closes the queue, wakes every waiting consumer and returns what was
    /// still queued.
    pub fn close(&self) -> Vec<T> {
        let drained = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.items.drain(..).collect()
        };
        self.permits.close();
        self.ready.notify_waiters();
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
