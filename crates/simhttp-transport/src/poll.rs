use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use simhttp_core::{
    PollOutcome, PollServiceHttpRequest, PollSessionManager, ServerConfig, WorkQueue,
};
use tokio::task::JoinHandle;

/// A fixed set of tasks servicing long-poll requests.
///
/// ## Lifecycle
/// Each worker pops one request, asks its handler whether events are ready
/// and either answers it or puts it back at the tail after the recheck
/// interval. A request is owned by one party at a time, so two workers never
/// look at the same request concurrently.
pub struct PollWorkerPool {
    sessions: Arc<PollSessionManager>,
    queue: Arc<WorkQueue<PollServiceHttpRequest>>,
    workers: usize,
    recheck: Duration,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PollWorkerPool {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_settings(
            config.poll_workers,
            config.poll_timeout(),
            config.poll_recheck_interval(),
            config.poll_queue_capacity,
        )
    }

    pub fn with_settings(
        workers: usize,
        default_timeout: Duration,
        recheck: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            sessions: Arc::new(PollSessionManager::new(default_timeout)),
            queue: Arc::new(WorkQueue::new(capacity)),
            workers: workers.max(1),
            recheck,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn sessions(&self) -> &Arc<PollSessionManager> {
        &self.sessions
    }

    /// Spawns the workers. Calling it again while they run is a no-op.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }
        for worker_id in 0..self.workers {
            let sessions = self.sessions.clone();
            let queue = self.queue.clone();
            let recheck = self.recheck;
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, sessions, queue, recheck).await;
            }));
        }
        tracing::debug!("Poll pool started with {} workers", self.workers);
    }

    /// Hands a new request to the workers, waiting for queue capacity.
    ///
    /// Once the pool is stopped the request is answered straight away with
    /// its handler's no-events response.
    pub async fn enqueue(&self, mut poll: PollServiceHttpRequest) {
        match self.queue.admit().await {
            Ok(permit) => {
                poll.attach_permit(permit);
                if let Err(poll) = self.queue.push(poll) {
                    self.sessions.abandon(poll);
                }
            }
            Err(_) => self.sessions.abandon(poll),
        }
    }

    /// Stops the workers and answers everything still queued.
    pub async fn stop(&self) {
        let pending = self.queue.close();
        if !pending.is_empty() {
            tracing::info!("Poll pool stopping with {} queued requests", pending.len());
        }
        for poll in pending {
            self.sessions.abandon(poll);
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Poll worker ended abnormally: {}", e);
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty() && !self.queue.is_closed()
    }
}

async fn run_worker(
    worker_id: usize,
    sessions: Arc<PollSessionManager>,
    queue: Arc<WorkQueue<PollServiceHttpRequest>>,
    recheck: Duration,
) {
    while let Some(poll) = queue.pop().await {
        match sessions.evaluate(&poll, Instant::now()) {
            PollOutcome::Ready(response) => sessions.finish(poll, response),
            PollOutcome::Pending => requeue(&queue, &sessions, poll, recheck),
        }
    }
    tracing::trace!("Poll worker {} exiting", worker_id);
}

/// Puts `poll` back at the tail once `delay` has passed, without holding a
/// worker while it waits.
fn requeue(
    queue: &Arc<WorkQueue<PollServiceHttpRequest>>,
    sessions: &Arc<PollSessionManager>,
    poll: PollServiceHttpRequest,
    delay: Duration,
) {
    let queue = queue.clone();
    let sessions = sessions.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(poll) = queue.push(poll) {
            sessions.abandon(poll);
        }
    });
}
