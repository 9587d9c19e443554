//! Trait and factory for our per-OS backends.
//! Backends can (and will) contain unsafe code, but they expose a safe interface here.

use std::fmt::Debug;
use std::rc::Rc;

use crate::device::UsbNode;
use crate::enumeration::enumerate_registry;
use crate::error::UsbResult;
use crate::registry::Registry;

#[cfg(target_os = "macos")]
mod macos;

/// Trait that unifies all of our OS-specific backends.
pub trait Backend: Debug {
    /// Returns one topology tree per USB host controller on the system.
    fn enumerate(&self) -> UsbResult<Vec<UsbNode>>;
}

/// Backend that enumerates any [Registry] implementation.
#[derive(Debug)]
pub struct RegistryBackend<R> {
    registry: R,
}

impl<R: Registry + Debug> RegistryBackend<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }
}

impl<R: Registry + Debug> Backend for RegistryBackend<R> {
    fn enumerate(&self) -> UsbResult<Vec<UsbNode>> {
        enumerate_registry(&self.registry)
    }
}

/// Creates a default backend implementation for MacOS machines.
#[cfg(target_os = "macos")]
pub fn create_default_backend() -> UsbResult<Rc<dyn Backend>> {
    Ok(Rc::new(RegistryBackend::new(macos::IoKitRegistry::new())))
}

/// There's no IO registry to walk anywhere else.
#[cfg(not(target_os = "macos"))]
pub fn create_default_backend() -> UsbResult<Rc<dyn Backend>> {
    Err(crate::error::Error::UnsupportedPlatform)
}
