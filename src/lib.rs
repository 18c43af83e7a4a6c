//! Asynchronous DNS-SD style service registration.
//!
//! Build a [`ServiceDescriptor`] through a [`Registrar`], hand it to a
//! [`RegistrationSession`], submit it, and await the one-shot [`Completion`].
//! Sessions can be cancelled at any time and are released explicitly or on
//! drop. The engine that actually announces the service sits behind the
//! [`DiscoveryEngine`] trait; [`MemoryEngine`] is an in-process implementation.
//!
//! ```
//! use std::time::Duration;
//! use netservice_register::{MemoryEngine, Outcome, Registrar, RegisterOptions, RegistrationSession};
//!
//! # async fn run() -> netservice_register::Result<()> {
//! let registrar = Registrar::new(MemoryEngine::new());
//! let mut service = registrar.create_service("local.", "_test._tcp", "test", 65535);
//! service.set_txt([("hello", "world")])?;
//!
//! let mut session = RegistrationSession::new(service);
//! let outcome = session
//!     .register_and_wait(RegisterOptions::empty(), Duration::from_secs(10))
//!     .await?;
//! assert_eq!(outcome, Outcome::Registered);
//! session.release()?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod descriptor;
pub mod engine;
pub mod error;
pub mod registrar;
pub mod session;
pub mod stream_error;
pub mod txt;

// Re-export key types
pub use descriptor::ServiceDescriptor;
pub use engine::{
    ClientContext, DiscoveryEngine, EngineHandle, MemoryEngine, MemoryEngineConfig, SessionId,
};
pub use error::{Error, Result};
pub use registrar::Registrar;
pub use session::{Completion, Outcome, RegisterOptions, RegistrationSession, SessionState};
pub use stream_error::{ErrorDomain, NetServicesCode, StreamError};
