//! Abstraction over the OS/host's USB topology.

use std::rc::Rc;

use crate::backend::{create_default_backend, Backend};
use crate::device::{DeviceSelector, UsbNode};
use crate::error::{self, UsbResult};

/// Representation of a USB host: that is, the thing (e.g. the OS) that knows which
/// USB devices are attached where.
pub struct Host {
    /// The backend used to provide the functions for this Host.
    backend: Rc<dyn Backend>,
}

impl Host {
    /// Creates a new Host, using the backend appropriate for the current platform.
    pub fn new() -> UsbResult<Self> {
        let backend = create_default_backend()?;
        Self::new_from_backend(backend)
    }

    /// Creates a new Host, from a custom backend; this allows the library to be
    /// used against e.g. a recorded or simulated registry.
    ///
    /// Most of the time, you want [Host::new].
    pub fn new_from_backend(backend: Rc<dyn Backend>) -> UsbResult<Self> {
        Ok(Host { backend })
    }

    /// Returns the full USB topology: one tree per host controller.
    pub fn enumerate(&self) -> UsbResult<Vec<UsbNode>> {
        self.backend.enumerate()
    }

    /// Helper for [Host::device] and [Host::devices]; finds one or more nodes matching a selector.
    fn find_devices(
        &self,
        selector: &DeviceSelector,
        single_device: bool,
    ) -> UsbResult<Vec<UsbNode>> {
        let mut matching_devices: Vec<UsbNode> = vec![];

        // Get the whole topology...
        let controllers = self.enumerate()?;

        // .... and then filter it down, flattened.
        for node in controllers.iter().flat_map(UsbNode::iter) {
            if selector.matches(node) {
                matching_devices.push(node.clone());

                // If we're only returning a single device, end here.
                if single_device {
                    return Ok(matching_devices);
                }
            }
        }

        Ok(matching_devices)
    }

    /// Returns the first node matching the given selector.
    pub fn device(&self, selector: &DeviceSelector) -> UsbResult<UsbNode> {
        let mut candidates = self.find_devices(selector, true)?;
        candidates.pop().ok_or(error::Error::DeviceNotFound)
    }

    /// Finds nodes anywhere in the topology, filtering by one or more criteria.
    pub fn devices(&self, selector: &DeviceSelector) -> UsbResult<Vec<UsbNode>> {
        self.find_devices(selector, false)
    }
}

/// Returns the USB topology of the system: one tree per host controller.
/// Convenience form that implicitly constructs (and destroys) a Host object.
pub fn enumerate() -> UsbResult<Vec<UsbNode>> {
    Host::new()?.enumerate()
}

/// Returns the first node matching the given selector.
/// Convenience form that implicitly constructs (and destroys) a Host object.
pub fn device(selector: &DeviceSelector) -> UsbResult<UsbNode> {
    Host::new()?.device(selector)
}

/// Finds nodes matching the given selector.
/// Convenience form that implicitly constructs (and destroys) a Host object.
pub fn devices(selector: &DeviceSelector) -> UsbResult<Vec<UsbNode>> {
    Host::new()?.devices(selector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Backend that always hands back the same topology.
    #[derive(Debug)]
    struct CannedBackend(Vec<UsbNode>);

    impl Backend for CannedBackend {
        fn enumerate(&self) -> UsbResult<Vec<UsbNode>> {
            Ok(self.0.clone())
        }
    }

    fn node(name: &str, vendor_id: &str, product_id: &str, children: Vec<UsbNode>) -> UsbNode {
        UsbNode {
            name: name.into(),
            vendor: String::new(),
            vendor_id: vendor_id.into(),
            product_id: product_id.into(),
            serial: String::new(),
            children,
        }
    }

    fn host() -> Host {
        let topology = vec![
            node(
                "AppleUSBXHCI",
                "8086",
                "a331",
                vec![node(
                    "USB2.0 Hub",
                    "0424",
                    "2514",
                    vec![node("Mouse", "0424", "2514", vec![])],
                )],
            ),
            node(
                "AppleUSBEHCI",
                "0000",
                "0000",
                vec![node("iPhone", "05ac", "12a8", vec![])],
            ),
        ];

        Host::new_from_backend(Rc::new(CannedBackend(topology))).unwrap()
    }

    #[test]
    fn devices_are_found_at_any_depth() {
        let hubs_and_children = host()
            .devices(&DeviceSelector {
                vendor_id: Some(0x0424),
                ..Default::default()
            })
            .unwrap();

        let names: Vec<&str> = hubs_and_children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["USB2.0 Hub", "Mouse"]);
    }

    #[test]
    fn device_returns_the_first_match() {
        let hub = host()
            .device(&DeviceSelector {
                vendor_id: Some(0x0424),
                product_id: Some(0x2514),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hub.name, "USB2.0 Hub");
        assert_eq!(hub.children.len(), 1);
    }

    #[test]
    fn device_reports_missing_devices() {
        let result = host().device(&DeviceSelector {
            vendor_id: Some(0x1d50),
            ..Default::default()
        });
        assert_eq!(result, Err(Error::DeviceNotFound));
    }

    #[test]
    fn empty_selector_returns_every_node() {
        let everything = host().devices(&DeviceSelector::default()).unwrap();
        assert_eq!(everything.len(), 5);
    }
}
