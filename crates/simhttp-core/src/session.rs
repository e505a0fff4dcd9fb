use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{oneshot, OwnedSemaphorePermit};

use crate::fields::{render_fields, request_fields, FieldMap};
use crate::handler::{HandlerResult, PollHandler, PollIdentity};
use crate::request::{HttpRequest, HttpResponse};

/// One in-flight long-poll request.
///
/// Owned by exactly one party at a time: the dispatcher, the work queue, or
/// the worker that popped it. `complete` consumes it, so it cannot be
/// answered twice.
pub struct PollServiceHttpRequest {
    identity: PollIdentity,
    handler: PollHandler,
    request: HttpRequest,
    enqueued_at: Instant,
    timeout: Duration,
    sink: oneshot::Sender<HttpResponse>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PollServiceHttpRequest {
    pub fn identity(&self) -> &PollIdentity {
        &self.identity
    }

    pub fn request_id(&self) -> u64 {
        self.identity.request_id
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.enqueued_at) >= self.timeout
    }

    /// Attaches the queue admission permit; released on completion.
    pub fn attach_permit(&mut self, permit: OwnedSemaphorePermit) {
        self.permit = Some(permit);
    }

    /// Sends the response to the waiting connection. Returns `false` when the
    /// connection is already gone.
    fn complete(self, response: HttpResponse) -> bool {
        self.sink.send(response).is_ok()
    }
}

pub enum PollOutcome {
    Ready(HttpResponse),
    Pending,
}

struct SessionRecord {
    session: String,
    path: String,
    enqueued_at: Instant,
}

/// Tracks outstanding long-poll requests and drives the poll contract:
/// events if there are any, the no-events answer once the timeout elapses.
pub struct PollSessionManager {
    next_id: AtomicU64,
    default_timeout: Duration,
    sessions: Mutex<HashMap<u64, SessionRecord>>,
}

impl PollSessionManager {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            default_timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Creates the poll request for `request`, runs the handler's arrival
    /// hook and returns the receiver the connection waits on.
    pub fn open(
        &self,
        handler: PollHandler,
        request: HttpRequest,
    ) -> (PollServiceHttpRequest, oneshot::Receiver<HttpResponse>) {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let identity = PollIdentity {
            request_id,
            session: handler.session().to_string(),
        };
        let enqueued_at = Instant::now();
        let (sink, receiver) = oneshot::channel();

        let fields = request_fields(&request);
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| {
            handler.service().on_request(&identity, &fields)
        })) {
            tracing::error!(
                "Poll request hook for session {} panicked: {}",
                identity.session,
                panic_message(&panic)
            );
        }

        self.sessions.lock().insert(
            request_id,
            SessionRecord {
                session: identity.session.clone(),
                path: request.path().to_string(),
                enqueued_at,
            },
        );

        let timeout = handler.timeout_or(self.default_timeout);
        let poll = PollServiceHttpRequest {
            identity,
            handler,
            request,
            enqueued_at,
            timeout,
            sink,
            permit: None,
        };
        (poll, receiver)
    }

    /// Checks a request once. `has_events` is always consulted before the
    /// timeout is considered.
    pub fn evaluate(&self, poll: &PollServiceHttpRequest, now: Instant) -> PollOutcome {
        let service = poll.handler.service();
        let identity = &poll.identity;

        let has_events = match guarded("has_events", identity, || service.has_events(identity)) {
            Ok(has) => has,
            Err(()) => return PollOutcome::Ready(poll_failure()),
        };

        if has_events {
            let fields = guarded("get_events", identity, || service.get_events(identity, &poll.request));
            return PollOutcome::Ready(render_or_fail("get_events", identity, fields));
        }

        if poll.is_expired(now) {
            let fields = guarded("no_events", identity, || service.no_events(identity, true));
            return PollOutcome::Ready(render_or_fail("no_events", identity, fields));
        }

        PollOutcome::Pending
    }

    /// Completes `poll` with `response` and forgets it.
    pub fn finish(&self, poll: PollServiceHttpRequest, response: HttpResponse) {
        let request_id = poll.request_id();
        if let Some(record) = self.sessions.lock().remove(&request_id) {
            tracing::trace!(
                "Poll {} for {} on {} completed after {:?}",
                request_id,
                record.session,
                record.path,
                record.enqueued_at.elapsed()
            );
        }
        if !poll.complete(response) {
            tracing::debug!("Poll {} completed but the client had already disconnected", request_id);
        }
    }

    /// Completes a request that will never be evaluated again, e.g. on
    /// shutdown, with the handler's no-events answer (`timed_out = false`).
    pub fn abandon(&self, poll: PollServiceHttpRequest) {
        let identity = poll.identity.clone();
        let service = poll.handler.service().clone();
        let fields = guarded("no_events", &identity, || service.no_events(&identity, false));
        let response = render_or_fail("no_events", &identity, fields);
        self.finish(poll, response);
    }

    pub fn outstanding(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn outstanding_for(&self, session: &str) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|record| record.session == session)
            .count()
    }
}

/// Runs a poll callback, turning both errors and panics into `Err(())`
/// after logging them.
fn guarded<T>(
    callback: &str,
    identity: &PollIdentity,
    f: impl FnOnce() -> HandlerResult<T>,
) -> Result<T, ()> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(
                "Poll {} callback {} for session {} failed: {}",
                identity.request_id,
                callback,
                identity.session,
                e
            );
            Err(())
        }
        Err(panic) => {
            tracing::error!(
                "Poll {} callback {} for session {} panicked: {}",
                identity.request_id,
                callback,
                identity.session,
                panic_message(&panic)
            );
            Err(())
        }
    }
}

fn render_or_fail(callback: &str, identity: &PollIdentity, fields: Result<FieldMap, ()>) -> HttpResponse {
    let Ok(fields) = fields else {
        return poll_failure();
    };
    match render_fields(&fields) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                "Poll {} callback {} returned an unusable response: {}",
                identity.request_id,
                callback,
                e
            );
            poll_failure()
        }
    }
}

fn poll_failure() -> HttpResponse {
    HttpResponse::new(500)
        .with_content_type("text/plain")
        .with_body("Internal Server Error")
        .with_keep_alive(false)
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
