//! Registration session: drives one descriptor through its lifecycle.
//!
//! ```text
//! Created --submit--> Registering --callback ok--> Registered
//!    |                    |      \--callback err--> Failed
//!    |                    |--sync reject--> Failed
//!    \------cancel--------+--cancel--> Cancelled
//! any --release--> Released
//! ```

use std::fmt;
use std::future::Future;
use std::ops::BitOr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::descriptor::ServiceDescriptor;
use crate::engine::{ClientContext, SessionId};
use crate::registrar::Registrar;
use crate::{Error, Result};

/// Registration option flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegisterOptions(u32);

impl RegisterOptions {
    /// Report a collision instead of picking a new instance name.
    pub const NO_AUTO_RENAME: Self = Self(1);

    /// No options.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True if every flag in `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RegisterOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Lifecycle state of a [`RegistrationSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Opened, nothing submitted yet.
    Created,
    /// Accepted by the engine, waiting for completion.
    Registering,
    /// The engine reported success.
    Registered,
    /// The engine rejected or failed the registration.
    Failed,
    /// Cancelled before completion.
    Cancelled,
    /// Resources released; no further operations are valid.
    Released,
}

impl SessionState {
    /// True once no further transition other than release can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Registered | Self::Failed | Self::Cancelled | Self::Released
        )
    }
}

/// Result delivered on the completion channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The service is being advertised.
    Registered,
    /// The engine reported a failure after accepting the registration.
    Failed(crate::StreamError),
    /// The session was cancelled or released before the engine answered.
    Cancelled,
}

impl Outcome {
    /// True for [`Outcome::Registered`].
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered)
    }
}

/// One-shot completion signal returned by [`RegistrationSession::submit`].
///
/// Resolves exactly once. If the session is cancelled or released before the
/// engine answers, it resolves to [`Outcome::Cancelled`], so awaiting it never
/// hangs on an abandoned session.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Outcome>,
}

impl Completion {
    fn channel() -> (oneshot::Sender<Outcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Wait at most `timeout`. `None` means the deadline passed first; the
    /// registration is left running.
    pub async fn wait_timeout(self, timeout: Duration) -> Option<Outcome> {
        tokio::time::timeout(timeout, self).await.ok()
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Outcome::Cancelled),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Drives one [`ServiceDescriptor`] through registration.
///
/// At most one registration is submitted per session; there is no automatic
/// retry. Dropping a session without calling [`release`](Self::release)
/// releases it implicitly.
pub struct RegistrationSession {
    id: SessionId,
    registrar: Registrar,
    client: ClientContext,
    descriptor: Option<ServiceDescriptor>,
}

impl RegistrationSession {
    /// Open a session that takes ownership of `descriptor`.
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        let registrar = descriptor.registrar().clone();
        let (id, client) = registrar.open_session();
        debug!(session = %id, handle = %descriptor.handle(), "opened registration session");
        Self {
            id,
            registrar,
            client,
            descriptor: Some(descriptor),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match self.descriptor {
            Some(_) => self
                .registrar
                .sessions()
                .state(self.id)
                .unwrap_or(SessionState::Released),
            None => SessionState::Released,
        }
    }

    /// The owned descriptor.
    pub fn descriptor(&self) -> Result<&ServiceDescriptor> {
        self.descriptor.as_ref().ok_or(Error::InvalidSession)
    }

    /// Submit the descriptor for registration.
    ///
    /// Returns synchronously once the engine has accepted or rejected the
    /// request. A rejection moves the session to [`SessionState::Failed`] and
    /// is returned as [`Error::Registration`]. On acceptance, a
    /// [`Completion`] is returned if `wants_completion` is set.
    ///
    /// Submitting twice fails with [`Error::AlreadyRegistering`]; submitting
    /// after release fails with [`Error::InvalidSession`] without contacting
    /// the engine.
    pub fn submit(
        &mut self,
        options: RegisterOptions,
        wants_completion: bool,
    ) -> Result<Option<Completion>> {
        let handle = self.descriptor()?.handle();

        let (tx, completion) = if wants_completion {
            let (tx, completion) = Completion::channel();
            (Some(tx), Some(completion))
        } else {
            (None, None)
        };

        let sessions = self.registrar.sessions();
        sessions.begin_registering(self.id, tx)?;

        let engine = self.registrar.engine();
        engine.set_client(handle, Some(self.client.clone()));
        if let Err(e) = engine.register(handle, options) {
            warn!(session = %self.id, %handle, error = %e, "engine rejected registration");
            engine.set_client(handle, None);
            sessions.submit_failed(self.id);
            return Err(Error::Registration(e));
        }

        info!(
            session = %self.id,
            %handle,
            options = options.bits(),
            "registration submitted"
        );
        Ok(completion)
    }

    /// Submit, then wait for completion at most `deadline`.
    ///
    /// On timeout the session is cancelled and [`Error::Timeout`] is returned.
    pub async fn register_and_wait(
        &mut self,
        options: RegisterOptions,
        deadline: Duration,
    ) -> Result<Outcome> {
        let Some(completion) = self.submit(options, true)? else {
            return Err(Error::InvalidSession);
        };
        match completion.wait_timeout(deadline).await {
            Some(outcome) => Ok(outcome),
            None => {
                self.cancel()?;
                Err(Error::Timeout(deadline))
            }
        }
    }

    /// Cancel a pending or unsubmitted registration.
    ///
    /// A pending completion resolves to [`Outcome::Cancelled`] and any engine
    /// callback that arrives afterwards is discarded. Cancelling a session
    /// that already completed or failed is a no-op.
    pub fn cancel(&mut self) -> Result<()> {
        let handle = self.descriptor()?.handle();
        match self.registrar.sessions().cancel(self.id) {
            Some(SessionState::Registering) => {
                self.registrar.engine().cancel(handle);
                info!(session = %self.id, %handle, "registration cancelled");
            }
            Some(SessionState::Created) => {
                debug!(session = %self.id, "session cancelled before submit");
            }
            Some(_) => {}
            None => return Err(Error::InvalidSession),
        }
        Ok(())
    }

    /// Release the session and its descriptor.
    ///
    /// The engine stops delivering callbacks first, then a pending
    /// registration is cancelled, then the engine handle is freed. Every
    /// later call on this session fails with [`Error::InvalidSession`].
    pub fn release(&mut self) -> Result<()> {
        let descriptor = self.descriptor.take().ok_or(Error::InvalidSession)?;
        let handle = descriptor.handle();
        let engine = self.registrar.engine();

        engine.set_client(handle, None);
        let previous = self.registrar.sessions().close(self.id);
        if previous == Some(SessionState::Registering) {
            engine.cancel(handle);
        }
        drop(descriptor);

        debug!(session = %self.id, %handle, ?previous, "registration session released");
        Ok(())
    }
}

impl Drop for RegistrationSession {
    fn drop(&mut self) {
        if self.descriptor.is_some() {
            // Only fails when already released.
            let _ = self.release();
        }
    }
}

impl fmt::Debug for RegistrationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::stream_error::{NetServicesCode, StreamError};
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn session(engine: &MemoryEngine, name: &str) -> RegistrationSession {
        let registrar = Registrar::new(engine.clone());
        RegistrationSession::new(registrar.create_service("local.", "_test._tcp", name, 8080))
    }

    #[test]
    fn options_combine() {
        let opts = RegisterOptions::empty() | RegisterOptions::NO_AUTO_RENAME;
        assert!(opts.contains(RegisterOptions::NO_AUTO_RENAME));
        assert!(!RegisterOptions::empty().contains(RegisterOptions::NO_AUTO_RENAME));
        assert_eq!(RegisterOptions::from_bits(1), RegisterOptions::NO_AUTO_RENAME);
    }

    #[test]
    fn create_then_release() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "svc");
        assert_eq!(s.state(), SessionState::Created);

        s.release().unwrap();
        assert_eq!(s.state(), SessionState::Released);
        assert!(engine.live_handles().is_empty());
        assert!(matches!(s.release(), Err(Error::InvalidSession)));
    }

    #[test]
    fn operations_after_release_fail() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "svc");
        s.release().unwrap();

        assert!(matches!(
            s.submit(RegisterOptions::empty(), true),
            Err(Error::InvalidSession)
        ));
        assert!(matches!(s.cancel(), Err(Error::InvalidSession)));
        assert!(matches!(s.descriptor(), Err(Error::InvalidSession)));
    }

    #[test]
    fn double_submit_is_rejected() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "svc");
        s.submit(RegisterOptions::empty(), false).unwrap();
        assert!(matches!(
            s.submit(RegisterOptions::empty(), false),
            Err(Error::AlreadyRegistering)
        ));
        assert_eq!(s.state(), SessionState::Registering);
    }

    #[test]
    fn sync_rejection_fails_session() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "");
        let err = s.submit(RegisterOptions::empty(), true).unwrap_err();

        assert_eq!(
            err.stream_error().copied(),
            Some(StreamError::net_services(NetServicesCode::BadArgument))
        );
        assert_eq!(s.state(), SessionState::Failed);
        assert!(engine.client(s.descriptor().unwrap().handle()).is_none());
    }

    #[test]
    fn completion_resolves_on_engine_callback() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "svc");
        let handle = s.descriptor().unwrap().handle();

        let mut completion = task::spawn(s.submit(RegisterOptions::empty(), true).unwrap().unwrap());
        assert_pending!(completion.poll());

        assert!(engine.fire(handle, None));
        assert!(completion.is_woken());
        assert_ready_eq!(completion.poll(), Outcome::Registered);
        assert_eq!(s.state(), SessionState::Registered);
    }

    #[test]
    fn state_tracks_engine_without_completion_channel() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "svc");
        let handle = s.descriptor().unwrap().handle();

        assert!(s.submit(RegisterOptions::empty(), false).unwrap().is_none());
        engine.fire(handle, None);
        assert_eq!(s.state(), SessionState::Registered);
    }

    #[test]
    fn cancel_signals_pending_completion() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "svc");
        let handle = s.descriptor().unwrap().handle();

        let mut completion = task::spawn(s.submit(RegisterOptions::empty(), true).unwrap().unwrap());
        s.cancel().unwrap();

        assert_ready_eq!(completion.poll(), Outcome::Cancelled);
        assert_eq!(s.state(), SessionState::Cancelled);
        assert!(!engine.fire(handle, None));
    }

    #[test]
    fn cancel_before_submit() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "svc");
        s.cancel().unwrap();
        assert_eq!(s.state(), SessionState::Cancelled);
        assert!(matches!(
            s.submit(RegisterOptions::empty(), true),
            Err(Error::AlreadyRegistering)
        ));
    }

    #[test]
    fn release_while_registering_resolves_completion() {
        let engine = MemoryEngine::manual();
        let mut s = session(&engine, "svc");

        let mut completion = task::spawn(s.submit(RegisterOptions::empty(), true).unwrap().unwrap());
        s.release().unwrap();

        assert_ready_eq!(completion.poll(), Outcome::Cancelled);
        assert!(engine.live_handles().is_empty());
    }

    #[test]
    fn drop_releases_session() {
        let engine = MemoryEngine::manual();
        let registrar = Registrar::new(engine.clone());
        let s = RegistrationSession::new(registrar.create_service("local.", "_t._tcp", "a", 1));
        assert_eq!(registrar.open_sessions(), 1);

        drop(s);
        assert_eq!(registrar.open_sessions(), 0);
        assert!(engine.live_handles().is_empty());
    }
}
