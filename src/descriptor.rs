//! Service descriptor: the identity and metadata of one advertisable service.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::engine::{DiscoveryEngine, EngineHandle};
use crate::registrar::Registrar;
use crate::{txt, Error, Result};

/// One advertisable service, backed by an engine handle.
///
/// Fields are fixed at creation. Metadata may be attached with
/// [`set_metadata`](Self::set_metadata) until the descriptor is moved into a
/// [`RegistrationSession`](crate::RegistrationSession); after that the session
/// only hands out shared references, so a submitted descriptor cannot change.
///
/// Dropping a descriptor releases its engine handle.
pub struct ServiceDescriptor {
    registrar: Registrar,
    handle: EngineHandle,
    domain: String,
    service_type: String,
    name: String,
    port: i32,
    metadata: Vec<u8>,
}

impl ServiceDescriptor {
    /// Create a descriptor. No validation happens here.
    pub fn new(
        registrar: &Registrar,
        domain: &str,
        service_type: &str,
        name: &str,
        port: i32,
    ) -> Self {
        let handle = registrar.engine().create(domain, service_type, name, port);
        debug!(%handle, name, service_type, domain, port, "created service descriptor");
        Self {
            registrar: registrar.clone(),
            handle,
            domain: domain.to_owned(),
            service_type: service_type.to_owned(),
            name: name.to_owned(),
            port,
            metadata: Vec::new(),
        }
    }

    /// Attach an encoded metadata blob (see [`txt`](crate::txt)).
    ///
    /// An empty blob clears metadata. Returns `false` if the engine rejects
    /// the blob, in which case the previous metadata is kept.
    pub fn set_metadata(&mut self, metadata: &[u8]) -> bool {
        let accepted = self.engine().set_metadata(self.handle, metadata);
        if accepted {
            self.metadata = metadata.to_vec();
        } else {
            debug!(handle = %self.handle, len = metadata.len(), "engine rejected metadata");
        }
        accepted
    }

    /// Encode `key=value` pairs and attach them.
    pub fn set_txt<I, K, V>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let blob = txt::encode(pairs)?;
        if self.set_metadata(&blob) {
            Ok(())
        } else {
            Err(Error::metadata("engine rejected metadata"))
        }
    }

    /// Registration domain, e.g. `local.`.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Service type, e.g. `_http._tcp`.
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port as passed at creation.
    pub fn port(&self) -> i32 {
        self.port
    }

    /// Attached metadata blob; empty if none.
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// Engine handle backing this descriptor.
    pub fn handle(&self) -> EngineHandle {
        self.handle
    }

    pub(crate) fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    fn engine(&self) -> &Arc<dyn DiscoveryEngine> {
        self.registrar.engine()
    }
}

impl Drop for ServiceDescriptor {
    fn drop(&mut self) {
        debug!(handle = %self.handle, "releasing service descriptor");
        self.engine().release(self.handle);
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("handle", &self.handle)
            .field("domain", &self.domain)
            .field("service_type", &self.service_type)
            .field("name", &self.name)
            .field("port", &self.port)
            .field("metadata_len", &self.metadata.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[test]
    fn passes_fields_through_unvalidated() {
        let registrar = Registrar::new(MemoryEngine::manual());
        let desc = registrar.create_service("", "", "", 70_000);
        assert_eq!(desc.domain(), "");
        assert_eq!(desc.port(), 70_000);
        assert!(desc.metadata().is_empty());
    }

    #[test]
    fn set_metadata_reaches_engine() {
        let engine = MemoryEngine::manual();
        let registrar = Registrar::new(engine.clone());
        let mut desc = registrar.create_service("local.", "_test._tcp", "test", 65535);

        assert!(desc.set_metadata(b"\x0bhello=world"));
        assert_eq!(engine.metadata(desc.handle()).unwrap(), b"\x0bhello=world");

        assert!(desc.set_metadata(&[]));
        assert!(desc.metadata().is_empty());
        assert!(engine.metadata(desc.handle()).unwrap().is_empty());
    }

    #[test]
    fn rejected_metadata_keeps_previous_blob() {
        let registrar = Registrar::new(MemoryEngine::manual());
        let mut desc = registrar.create_service("local.", "_test._tcp", "test", 80);
        desc.set_txt([("a", "1")]).unwrap();

        assert!(!desc.set_metadata(b"\x05ab"));
        assert_eq!(desc.metadata(), b"\x03a=1");
    }

    #[test]
    fn drop_releases_engine_handle() {
        let engine = MemoryEngine::manual();
        let registrar = Registrar::new(engine.clone());
        let desc = registrar.create_service("local.", "_test._tcp", "test", 80);
        assert_eq!(engine.live_handles(), vec![desc.handle()]);

        drop(desc);
        assert!(engine.live_handles().is_empty());
    }
}
