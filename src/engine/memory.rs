//! In-process loopback engine.
//!
//! Keeps registrations in memory and enforces the same rules a network
//! engine would report: argument checks, per-handle single registration and
//! name collisions within a domain and service type. Completion is delivered
//! on a separate thread, or on demand in manual mode.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{ClientContext, DiscoveryEngine, EngineHandle};
use crate::session::RegisterOptions;
use crate::stream_error::{NetServicesCode, StreamError};
use crate::txt::{self, MAX_TXT_LEN};

/// Configuration for [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryEngineConfig {
    /// Delay before an accepted registration completes. Default: 0.
    pub completion_delay: Duration,
    /// If set, completions are only delivered through [`MemoryEngine::fire`].
    pub manual_completion: bool,
    /// Largest accepted metadata blob. Default: 65535 bytes.
    pub max_metadata_len: usize,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            completion_delay: Duration::ZERO,
            manual_completion: false,
            max_metadata_len: MAX_TXT_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Registering,
    Registered,
}

struct Service {
    domain: String,
    service_type: String,
    name: String,
    port: i32,
    metadata: Vec<u8>,
    client: Option<ClientContext>,
    phase: Phase,
}

impl Service {
    fn same_instance(&self, domain: &str, service_type: &str, name: &str) -> bool {
        self.domain.eq_ignore_ascii_case(domain)
            && self.service_type.eq_ignore_ascii_case(service_type)
            && self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Default)]
struct Inner {
    next_handle: u64,
    services: HashMap<EngineHandle, Service>,
}

/// In-memory [`DiscoveryEngine`].
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<Mutex<Inner>>,
    config: MemoryEngineConfig,
}

impl MemoryEngine {
    /// Create an engine that completes registrations immediately.
    pub fn new() -> Self {
        Self::with_config(MemoryEngineConfig::default())
    }

    /// Create an engine that only completes registrations via [`fire`](Self::fire).
    pub fn manual() -> Self {
        Self::with_config(MemoryEngineConfig {
            manual_completion: true,
            ..Default::default()
        })
    }

    /// Create an engine with custom configuration.
    pub fn with_config(config: MemoryEngineConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            config,
        }
    }

    /// Complete a pending registration. `None` reports success.
    ///
    /// Returns `false` if the handle is not currently registering.
    pub fn fire(&self, handle: EngineHandle, error: Option<StreamError>) -> bool {
        let client = {
            let mut inner = self.inner.lock();
            let Some(service) = inner.services.get_mut(&handle) else {
                return false;
            };
            if service.phase != Phase::Registering {
                return false;
            }
            service.phase = match error {
                None => Phase::Registered,
                Some(_) => Phase::Idle,
            };
            service.client.clone()
        };

        if let Some(client) = client {
            client.complete(handle, error);
        }
        true
    }

    /// True if a live registration holds this instance name.
    pub fn is_advertised(&self, domain: &str, service_type: &str, name: &str) -> bool {
        self.inner.lock().services.values().any(|s| {
            s.phase == Phase::Registered && s.same_instance(domain, service_type, name)
        })
    }

    /// Metadata currently attached to a handle.
    pub fn metadata(&self, handle: EngineHandle) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .services
            .get(&handle)
            .map(|s| s.metadata.clone())
    }

    /// Callback target currently associated with a handle.
    pub fn client(&self, handle: EngineHandle) -> Option<ClientContext> {
        self.inner
            .lock()
            .services
            .get(&handle)
            .and_then(|s| s.client.clone())
    }

    /// Handles that have been created and not yet released.
    pub fn live_handles(&self) -> Vec<EngineHandle> {
        let mut handles: Vec<_> = self.inner.lock().services.keys().copied().collect();
        handles.sort();
        handles
    }

    fn complete_later(&self, handle: EngineHandle) {
        let inner = Arc::clone(&self.inner);
        let delay = self.config.completion_delay;

        std::thread::spawn(move || {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            let client = {
                let mut inner = inner.lock();
                match inner.services.get_mut(&handle) {
                    Some(service) if service.phase == Phase::Registering => {
                        service.phase = Phase::Registered;
                        service.client.clone()
                    }
                    _ => None,
                }
            };
            if let Some(client) = client {
                client.complete(handle, None);
            }
        });
    }
}

fn net_services(code: NetServicesCode) -> StreamError {
    StreamError::net_services(code)
}

impl DiscoveryEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create(&self, domain: &str, service_type: &str, name: &str, port: i32) -> EngineHandle {
        let mut inner = self.inner.lock();
        inner.next_handle += 1;
        let handle = EngineHandle::from_raw(inner.next_handle);
        inner.services.insert(
            handle,
            Service {
                domain: domain.to_owned(),
                service_type: service_type.to_owned(),
                name: name.to_owned(),
                port,
                metadata: Vec::new(),
                client: None,
                phase: Phase::Idle,
            },
        );
        debug!(%handle, name, service_type, domain, port, "memory engine: created service");
        handle
    }

    fn set_metadata(&self, handle: EngineHandle, metadata: &[u8]) -> bool {
        if metadata.len() > self.config.max_metadata_len {
            debug!(%handle, len = metadata.len(), "memory engine: metadata too large");
            return false;
        }
        if let Err(e) = txt::decode(metadata) {
            debug!(%handle, error = %e, "memory engine: malformed metadata");
            return false;
        }
        match self.inner.lock().services.get_mut(&handle) {
            Some(service) => {
                service.metadata = metadata.to_vec();
                true
            }
            None => false,
        }
    }

    fn set_client(&self, handle: EngineHandle, client: Option<ClientContext>) {
        if let Some(service) = self.inner.lock().services.get_mut(&handle) {
            service.client = client;
        }
    }

    fn register(&self, handle: EngineHandle, options: RegisterOptions) -> Result<(), StreamError> {
        {
            let mut inner = self.inner.lock();
            let service = inner
                .services
                .get(&handle)
                .ok_or_else(|| net_services(NetServicesCode::Invalid))?;

            if service.phase != Phase::Idle {
                return Err(net_services(NetServicesCode::InProgress));
            }
            if service.domain.is_empty()
                || service.service_type.is_empty()
                || service.name.is_empty()
                || !(0..=i32::from(u16::MAX)).contains(&service.port)
            {
                return Err(net_services(NetServicesCode::BadArgument));
            }

            let collides = inner.services.iter().any(|(other, s)| {
                *other != handle
                    && s.phase != Phase::Idle
                    && s.same_instance(&service.domain, &service.service_type, &service.name)
            });
            if collides {
                return Err(net_services(NetServicesCode::Collision));
            }

            if let Some(service) = inner.services.get_mut(&handle) {
                service.phase = Phase::Registering;
                info!(
                    %handle,
                    name = %service.name,
                    service_type = %service.service_type,
                    options = options.bits(),
                    "memory engine: registering service"
                );
            }
        }

        if !self.config.manual_completion {
            self.complete_later(handle);
        }
        Ok(())
    }

    fn cancel(&self, handle: EngineHandle) {
        if let Some(service) = self.inner.lock().services.get_mut(&handle) {
            if service.phase != Phase::Idle {
                debug!(%handle, "memory engine: registration withdrawn");
            }
            service.phase = Phase::Idle;
        }
    }

    fn release(&self, handle: EngineHandle) {
        if self.inner.lock().services.remove(&handle).is_some() {
            debug!(%handle, "memory engine: released service");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collision() -> StreamError {
        StreamError::net_services(NetServicesCode::Collision)
    }

    #[test]
    fn rejects_bad_arguments() {
        let engine = MemoryEngine::manual();
        let empty_name = engine.create("local.", "_test._tcp", "", 80);
        let bad_port = engine.create("local.", "_test._tcp", "svc", 70_000);
        let negative_port = engine.create("local.", "_test._tcp", "svc", -1);

        let bad_argument = StreamError::net_services(NetServicesCode::BadArgument);
        for handle in [empty_name, bad_port, negative_port] {
            assert_eq!(
                engine.register(handle, RegisterOptions::empty()),
                Err(bad_argument)
            );
        }
    }

    #[test]
    fn second_register_on_same_handle_is_in_progress() {
        let engine = MemoryEngine::manual();
        let handle = engine.create("local.", "_test._tcp", "svc", 80);
        engine.register(handle, RegisterOptions::empty()).unwrap();
        assert_eq!(
            engine.register(handle, RegisterOptions::empty()),
            Err(StreamError::net_services(NetServicesCode::InProgress))
        );
    }

    #[test]
    fn detects_collisions_case_insensitively_until_cancel() {
        let engine = MemoryEngine::manual();
        let first = engine.create("local.", "_test._tcp", "Printer", 80);
        let second = engine.create("local.", "_test._tcp", "printer", 81);
        let other_type = engine.create("local.", "_other._tcp", "printer", 82);

        engine.register(first, RegisterOptions::empty()).unwrap();
        assert_eq!(
            engine.register(second, RegisterOptions::empty()),
            Err(collision())
        );
        engine.register(other_type, RegisterOptions::empty()).unwrap();

        engine.cancel(first);
        engine.register(second, RegisterOptions::empty()).unwrap();
    }

    #[test]
    fn metadata_checks() {
        let engine = MemoryEngine::with_config(MemoryEngineConfig {
            max_metadata_len: 8,
            manual_completion: true,
            ..Default::default()
        });
        let handle = engine.create("local.", "_test._tcp", "svc", 80);

        assert!(engine.set_metadata(handle, b"\x03a=b"));
        assert_eq!(engine.metadata(handle).unwrap(), b"\x03a=b");
        assert!(!engine.set_metadata(handle, b"\x09truncated"));
        assert!(!engine.set_metadata(handle, b"\x0bhello=world"));
        assert!(engine.set_metadata(handle, b""));
        assert!(engine.metadata(handle).unwrap().is_empty());
    }

    #[test]
    fn fire_only_applies_to_registering_handles() {
        let engine = MemoryEngine::manual();
        let handle = engine.create("local.", "_test._tcp", "svc", 80);
        assert!(!engine.fire(handle, None));

        engine.register(handle, RegisterOptions::empty()).unwrap();
        assert!(engine.fire(handle, None));
        assert!(engine.is_advertised("local.", "_test._tcp", "svc"));
        assert!(!engine.fire(handle, None));
    }

    #[test]
    fn release_frees_handle() {
        let engine = MemoryEngine::manual();
        let a = engine.create("local.", "_test._tcp", "a", 80);
        let b = engine.create("local.", "_test._tcp", "b", 80);
        assert_eq!(engine.live_handles(), vec![a, b]);

        engine.release(a);
        assert_eq!(engine.live_handles(), vec![b]);
        assert!(!engine.set_metadata(a, b""));
    }
}
