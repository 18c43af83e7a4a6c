//! Registrar: binds an engine to a table of sessions keyed by id.
//!
//! The engine's completion callback carries only a [`SessionId`]; the table
//! owns each session's state and completion sender, so a late or duplicate
//! callback can be checked against the current state instead of touching
//! freed memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::descriptor::ServiceDescriptor;
use crate::engine::{ClientContext, DiscoveryEngine, EngineHandle, SessionId};
use crate::session::{Outcome, SessionState};
use crate::stream_error::StreamError;
use crate::{Error, Result};

struct Slot {
    state: SessionState,
    completion: Option<oneshot::Sender<Outcome>>,
}

impl Slot {
    fn notify(&mut self, outcome: Outcome) {
        if let Some(tx) = self.completion.take() {
            // Receiver may already be gone; nothing to do then.
            let _ = tx.send(outcome);
        }
    }
}

/// Per-registrar session bookkeeping shared with engine callbacks.
#[derive(Default)]
pub(crate) struct SessionTable {
    next_id: AtomicU64,
    slots: Mutex<HashMap<SessionId, Slot>>,
}

impl SessionTable {
    fn open(&self) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.slots.lock().insert(
            id,
            Slot {
                state: SessionState::Created,
                completion: None,
            },
        );
        id
    }

    pub(crate) fn state(&self, id: SessionId) -> Option<SessionState> {
        self.slots.lock().get(&id).map(|s| s.state)
    }

    /// `Created -> Registering`. Must happen before the engine is asked to
    /// register, since the engine may call back before `register` returns.
    pub(crate) fn begin_registering(
        &self,
        id: SessionId,
        completion: Option<oneshot::Sender<Outcome>>,
    ) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&id).ok_or(Error::InvalidSession)?;
        if slot.state != SessionState::Created {
            return Err(Error::AlreadyRegistering);
        }
        slot.state = SessionState::Registering;
        slot.completion = completion;
        Ok(())
    }

    /// `Registering -> Failed` after a synchronous engine rejection. The
    /// completion sender is dropped without a notification.
    pub(crate) fn submit_failed(&self, id: SessionId) {
        if let Some(slot) = self.slots.lock().get_mut(&id) {
            if slot.state == SessionState::Registering {
                slot.state = SessionState::Failed;
                slot.completion = None;
            }
        }
    }

    /// `{Created, Registering} -> Cancelled`. Returns the state the session
    /// was in, or `None` if it is unknown.
    pub(crate) fn cancel(&self, id: SessionId) -> Option<SessionState> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(&id)?;
        let previous = slot.state;
        match previous {
            SessionState::Created => slot.state = SessionState::Cancelled,
            SessionState::Registering => {
                slot.state = SessionState::Cancelled;
                slot.notify(Outcome::Cancelled);
            }
            _ => {}
        }
        Some(previous)
    }

    /// Forget a session. Any pending completion sender is dropped, which the
    /// receiving side observes as cancellation.
    pub(crate) fn close(&self, id: SessionId) -> Option<SessionState> {
        self.slots.lock().remove(&id).map(|s| s.state)
    }

    pub(crate) fn on_engine_callback(
        &self,
        id: SessionId,
        handle: EngineHandle,
        error: Option<StreamError>,
    ) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&id) else {
            debug!(session = %id, %handle, "completion for a released session, discarding");
            return;
        };
        if slot.state != SessionState::Registering {
            debug!(
                session = %id,
                %handle,
                state = ?slot.state,
                "completion outside registering state, discarding"
            );
            return;
        }

        match error {
            None => {
                info!(session = %id, %handle, "service registered");
                slot.state = SessionState::Registered;
                slot.notify(Outcome::Registered);
            }
            Some(e) => {
                warn!(session = %id, %handle, error = %e, "service registration failed");
                slot.state = SessionState::Failed;
                slot.notify(Outcome::Failed(e));
            }
        }
    }

    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Entry point for advertising services through one engine.
///
/// Registrars are independent of each other; there is no process-wide state.
/// Cloning shares the engine and the session table.
#[derive(Clone)]
pub struct Registrar {
    engine: Arc<dyn DiscoveryEngine>,
    sessions: Arc<SessionTable>,
}

impl Registrar {
    /// Create a registrar driving the given engine.
    pub fn new<E: DiscoveryEngine>(engine: E) -> Self {
        Self::from_arc(Arc::new(engine))
    }

    /// Create a registrar from a shared engine.
    pub fn from_arc(engine: Arc<dyn DiscoveryEngine>) -> Self {
        Self {
            engine,
            sessions: Arc::new(SessionTable::default()),
        }
    }

    /// Build a service descriptor backed by a fresh engine handle.
    ///
    /// Arguments are not validated here; the engine reports invalid values
    /// when the service is submitted.
    pub fn create_service(
        &self,
        domain: &str,
        service_type: &str,
        name: &str,
        port: i32,
    ) -> ServiceDescriptor {
        ServiceDescriptor::new(self, domain, service_type, name, port)
    }

    /// Number of sessions opened and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Name of the underlying engine.
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub(crate) fn engine(&self) -> &Arc<dyn DiscoveryEngine> {
        &self.engine
    }

    pub(crate) fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub(crate) fn open_session(&self) -> (SessionId, ClientContext) {
        let id = self.sessions.open();
        let client = ClientContext::new(id, Arc::downgrade(&self.sessions));
        (id, client)
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("engine", &self.engine.name())
            .field("open_sessions", &self.open_sessions())
            .finish()
    }
}
