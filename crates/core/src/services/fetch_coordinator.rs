//! Concurrent fetch coordinator.
//!
//! A batch of requests is registered against the shared [`Transport`], driven
//! to completion by one poll loop, and can be cancelled from any thread while
//! that loop is running.
//!
//! Locking:
//! - `poll_lock` (async) is held by [`FetchCoordinator::run_to_completion`]
//!   for its whole poll loop.
//! - `handles` (blocking) guards attaching and detaching sessions. It is the
//!   only lock [`FetchCoordinator::cancel_session`] takes, so cancellation
//!   never waits for a poll quantum to elapse.
//!
//! Lock order is `handles` → slot state → response buffer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::collaborators::EngineObserver;
use crate::errors::{CoreError, TransportError};
use crate::models::resource::ResourceId;
use crate::models::settings::FetchTimeouts;
use crate::providers::traits::{BodySink, Transport};

// ── Buffers & Requests ──────────────────────────────────────────────

/// Output buffer for one request, shared between the caller and the
/// coordinator. Empty after a failed or cancelled transfer.
#[derive(Debug, Clone, Default)]
pub struct ResponseBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the contents and release the allocation.
    pub fn clear(&self) {
        let mut bytes = self.lock();
        bytes.clear();
        bytes.shrink_to_fit();
    }

    pub fn append(&self, chunk: &[u8]) {
        self.lock().extend_from_slice(chunk);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Move the contents out, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }
}

/// One resource to fetch and where to put the body.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub resource: ResourceId,
    pub url: String,
    pub buffer: ResponseBuffer,
}

impl FetchRequest {
    pub fn new(resource: ResourceId, url: impl Into<String>) -> Self {
        Self::with_buffer(resource, url, ResponseBuffer::new())
    }

    /// Reuse an existing buffer; it is cleared when the batch begins.
    pub fn with_buffer(resource: ResourceId, url: impl Into<String>, buffer: ResponseBuffer) -> Self {
        Self {
            resource,
            url: url.into(),
            buffer,
        }
    }
}

/// Lifecycle of one request:
/// `Idle → Registered → InFlight → {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Registered,
    InFlight,
    Completed,
    Failed(TransportError),
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed(_) | RequestState::Cancelled
        )
    }
}

// ── Slots & Sessions ────────────────────────────────────────────────

struct RequestSlot {
    resource: ResourceId,
    url: String,
    buffer: ResponseBuffer,
    state: Mutex<RequestState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RequestSlot {
    fn register(request: FetchRequest) -> Self {
        request.buffer.clear();
        Self {
            resource: request.resource,
            url: request.url,
            buffer: request.buffer,
            state: Mutex::new(RequestState::Registered),
            task: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, RequestState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `Registered → InFlight`. False if the slot was already moved on.
    fn begin(&self) -> bool {
        let mut state = self.state();
        if *state != RequestState::Registered {
            return false;
        }
        *state = RequestState::InFlight;
        true
    }

    /// `InFlight → Completed | Failed`. No-op once terminal (e.g. cancelled).
    fn finish(&self, result: Result<(), TransportError>) {
        let mut state = self.state();
        if *state != RequestState::InFlight {
            return;
        }
        *state = match result {
            Ok(()) => RequestState::Completed,
            Err(e) => {
                self.buffer.clear();
                RequestState::Failed(e)
            }
        };
    }

    /// `Registered | InFlight → Cancelled`; returns whether it changed.
    fn cancel(&self) -> bool {
        let mut state = self.state();
        if state.is_terminal() {
            return false;
        }
        *state = RequestState::Cancelled;
        if let Some(task) = self.task().take() {
            task.abort();
        }
        true
    }

    /// Still `InFlight` although its task is gone: the worker died without
    /// reporting.
    fn is_orphaned(&self) -> bool {
        *self.state() == RequestState::InFlight
            && self.task().as_ref().is_some_and(|task| task.is_finished())
    }
}

impl BodySink for RequestSlot {
    fn write(&self, chunk: &[u8]) -> bool {
        let state = self.state();
        if *state != RequestState::InFlight {
            return false;
        }
        self.buffer.append(chunk);
        true
    }
}

struct SessionInner {
    id: Uuid,
    slots: Vec<Arc<RequestSlot>>,
    /// Woken by completing transfers and by cancellation.
    wake: Notify,
}

/// Handle to one registered batch. Cheap to clone and safe to share with
/// another thread that may want to cancel it.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("requests", &self.inner.slots.len())
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    /// Current state of every request, in registration order.
    pub fn states(&self) -> Vec<(ResourceId, RequestState)> {
        self.inner
            .slots
            .iter()
            .map(|slot| (slot.resource.clone(), slot.state().clone()))
            .collect()
    }

    pub fn state_of(&self, idx: usize) -> Option<RequestState> {
        self.inner.slots.get(idx).map(|slot| slot.state().clone())
    }

    /// Number of requests that ended in `Failed`.
    pub fn failure_count(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| matches!(*slot.state(), RequestState::Failed(_)))
            .count()
    }

    pub fn failures(&self) -> Vec<(ResourceId, TransportError)> {
        self.inner
            .slots
            .iter()
            .filter_map(|slot| match &*slot.state() {
                RequestState::Failed(e) => Some((slot.resource.clone(), e.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.inner
            .slots
            .iter()
            .any(|slot| *slot.state() == RequestState::Cancelled)
    }

    fn fatal_error(&self) -> Option<String> {
        self.inner.slots.iter().find_map(|slot| {
            if let RequestState::Failed(TransportError::Fatal(reason)) = &*slot.state() {
                return Some(format!("{}: {reason}", slot.resource));
            }
            if slot.is_orphaned() {
                return Some(format!("{}: worker task ended without reporting", slot.resource));
            }
            None
        })
    }

    fn running(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| !slot.state().is_terminal())
            .count()
    }
}

/// `1 - running / expected`, clamped to `[0, 1]`.
pub fn progress_fraction(running: usize, expected: usize) -> f64 {
    if expected == 0 {
        return 1.0;
    }
    (1.0 - running as f64 / expected as f64).clamp(0.0, 1.0)
}

// ── Coordinator ─────────────────────────────────────────────────────

/// Drives batches of concurrent requests over one shared [`Transport`].
pub struct FetchCoordinator {
    transport: Arc<dyn Transport>,
    timeouts: FetchTimeouts,
    /// Held for the whole poll loop of `run_to_completion`.
    poll_lock: tokio::sync::Mutex<()>,
    /// Attached sessions. Never held across an await.
    handles: Mutex<HashMap<Uuid, Arc<SessionInner>>>,
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("transport", &self.transport.name())
            .field("timeouts", &self.timeouts)
            .field("registered_handles", &self.registered_handles())
            .finish()
    }
}

impl FetchCoordinator {
    pub fn new(transport: Arc<dyn Transport>, timeouts: FetchTimeouts) -> Self {
        Self {
            transport,
            timeouts,
            poll_lock: tokio::sync::Mutex::new(()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeouts(&self) -> &FetchTimeouts {
        &self.timeouts
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<SessionInner>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of request handles currently attached to the transport.
    pub fn registered_handles(&self) -> usize {
        self.handles().values().map(|s| s.slots.len()).sum()
    }

    /// Register a batch. Every request's buffer is cleared first; nothing is
    /// sent until [`Self::run_to_completion`].
    pub fn begin_batch(&self, requests: Vec<FetchRequest>) -> SessionHandle {
        let slots = requests
            .into_iter()
            .map(|request| Arc::new(RequestSlot::register(request)))
            .collect();
        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            slots,
            wake: Notify::new(),
        });
        self.handles().insert(inner.id, Arc::clone(&inner));
        debug!("Registered batch {} with {} request(s)", inner.id, inner.slots.len());
        SessionHandle { inner }
    }

    /// Start every registered transfer and poll until none is in flight.
    ///
    /// Publishes progress after every poll quantum. Returns the number of
    /// failed transfers; a cancelled batch returns early with whatever had
    /// failed so far. A fatal transport failure abandons the batch and is
    /// the only error returned.
    pub async fn run_to_completion(
        &self,
        session: &SessionHandle,
        expected: usize,
        observer: &dyn EngineObserver,
    ) -> Result<usize, CoreError> {
        let _polling = self.poll_lock.lock().await;

        if !self.start_transfers(session) {
            debug!("Batch {} was detached before it started", session.id());
            return Ok(session.failure_count());
        }

        let quantum = self.timeouts.poll_quantum();
        loop {
            tokio::select! {
                _ = session.inner.wake.notified() => {}
                _ = tokio::time::sleep(quantum) => {}
            }

            // A finished batch is detached under the same lock that saw it
            // finish, so a later cancel cannot clear its buffers.
            let poll = {
                let mut handles = self.handles();
                if !handles.contains_key(&session.id()) {
                    None
                } else {
                    let running = session.running();
                    let fatal = session.fatal_error();
                    if running == 0 && fatal.is_none() {
                        handles.remove(&session.id());
                    }
                    Some((running, fatal))
                }
            };
            let Some((running, fatal)) = poll else {
                debug!("Batch {} cancelled while polling", session.id());
                return Ok(session.failure_count());
            };

            observer.on_progress(progress_fraction(running, expected));

            if let Some(reason) = fatal {
                warn!("Abandoning batch {}: {reason}", session.id());
                self.cancel_session(session);
                return Err(CoreError::FetchAborted(reason));
            }
            if running == 0 {
                break;
            }
        }

        let failures = session.failure_count();
        if failures > 0 {
            debug!("Batch {} finished with {failures} failed request(s)", session.id());
        }
        Ok(failures)
    }

    /// Spawn one task per registered slot. Done under the handle lock so a
    /// concurrent cancel sees either no task or an abortable one.
    fn start_transfers(&self, session: &SessionHandle) -> bool {
        let handles = self.handles();
        if !handles.contains_key(&session.id()) {
            return false;
        }

        for slot in &session.inner.slots {
            if !slot.begin() {
                continue;
            }
            let transport = Arc::clone(&self.transport);
            let worker_slot = Arc::clone(slot);
            let inner = Arc::clone(&session.inner);
            let total = self.timeouts.total();

            let task = tokio::spawn(async move {
                let sink: &dyn BodySink = worker_slot.as_ref();
                let result = match tokio::time::timeout(total, transport.fetch(&worker_slot.url, sink)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout),
                };
                if let Err(e) = &result {
                    debug!("{} failed: {e}", worker_slot.resource);
                }
                worker_slot.finish(result);
                inner.wake.notify_one();
            });
            *slot.task() = Some(task);
        }
        drop(handles);
        true
    }

    /// Cancel a batch from any thread, including while
    /// [`Self::run_to_completion`] is polling it.
    ///
    /// Non-terminal requests become `Cancelled` and their tasks are aborted;
    /// every buffer of the batch is cleared and the batch is detached.
    /// Cancelling a batch that already finished or was already cancelled is
    /// a no-op. Returns the number of requests that were cancelled.
    pub fn cancel_session(&self, session: &SessionHandle) -> usize {
        let mut handles = self.handles();
        if handles.remove(&session.id()).is_none() {
            return 0;
        }
        let mut cancelled = 0;
        for slot in &session.inner.slots {
            if slot.cancel() {
                cancelled += 1;
            }
            slot.buffer.clear();
        }
        drop(handles);

        session.inner.wake.notify_one();
        debug!("Cancelled batch {} ({cancelled} request(s) in flight)", session.id());
        cancelled
    }

    /// Cancel every attached batch. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let sessions: Vec<SessionHandle> = self
            .handles()
            .values()
            .map(|inner| SessionHandle {
                inner: Arc::clone(inner),
            })
            .collect();
        sessions.iter().map(|s| self.cancel_session(s)).sum()
    }
}
