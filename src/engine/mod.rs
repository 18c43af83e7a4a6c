//! Contract expected from the underlying service-discovery engine.
//!
//! The engine is the component that actually announces a service on the
//! network. This crate only drives it: create a handle, attach metadata,
//! register, cancel and release. Completion is reported back through a
//! [`ClientContext`], which routes the callback to the owning session by id
//! instead of through an untyped context pointer.

pub mod memory;

use std::fmt;
use std::sync::Weak;

use crate::registrar::SessionTable;
use crate::session::RegisterOptions;
use crate::stream_error::StreamError;

pub use memory::{MemoryEngine, MemoryEngineConfig};

/// Opaque identifier of an engine-side service resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineHandle(u64);

impl EngineHandle {
    /// Wrap a raw engine identifier.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw engine identifier.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svc#{}", self.0)
    }
}

/// Identifier of a registration session within its [`Registrar`](crate::Registrar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Callback target handed to the engine for one session.
///
/// Cloning is cheap. Invoking [`complete`](ClientContext::complete) never
/// blocks on the caller and is a no-op once the session has left the
/// registering state or has been released.
#[derive(Clone)]
pub struct ClientContext {
    session: SessionId,
    table: Weak<SessionTable>,
}

impl ClientContext {
    pub(crate) fn new(session: SessionId, table: Weak<SessionTable>) -> Self {
        Self { session, table }
    }

    /// Session this context routes to.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report the end of a registration. `None` means success.
    pub fn complete(&self, handle: EngineHandle, error: Option<StreamError>) {
        match self.table.upgrade() {
            Some(table) => table.on_engine_callback(self.session, handle, error),
            None => tracing::debug!(
                session = %self.session,
                %handle,
                "completion for a dropped registrar, discarding"
            ),
        }
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// A service-discovery engine.
///
/// Implementations must be callable from any thread. A handle returned by
/// [`create`](DiscoveryEngine::create) is released exactly once by this crate.
pub trait DiscoveryEngine: Send + Sync + 'static {
    /// Human-readable name for logging (e.g. "memory", "bonjour").
    fn name(&self) -> &'static str;

    /// Allocate a service resource. Arguments are passed through unvalidated;
    /// the engine reports problems when registering.
    fn create(&self, domain: &str, service_type: &str, name: &str, port: i32) -> EngineHandle;

    /// Attach a metadata blob. An empty blob clears metadata.
    /// Returns `false` if the engine rejects the blob.
    fn set_metadata(&self, handle: EngineHandle, metadata: &[u8]) -> bool;

    /// Associate or clear the completion callback target.
    fn set_client(&self, handle: EngineHandle, client: Option<ClientContext>);

    /// Start registering. Returns immediately: `Err` means registration never
    /// started; `Ok` means the client will be notified exactly once later.
    fn register(&self, handle: EngineHandle, options: RegisterOptions) -> Result<(), StreamError>;

    /// Ask the engine to abandon or withdraw a registration.
    fn cancel(&self, handle: EngineHandle);

    /// Free the service resource.
    fn release(&self, handle: EngineHandle);
}
