//! Routines for turning the IO registry into a tree of USB nodes.
//!
//! Controllers are found by class, and their descendants by walking the IOService plane.
//! Who-is-attached-to-whom, though, comes from the IOUSB plane; devices whose IOUSB parent
//! is the registry root hang directly off the controller that found them.

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::device::{UsbNode, UNKNOWN_ID};
use crate::error::{Error, UsbResult};
use crate::registry::{
    keys, Registry, RegistryId, SERVICE_PLANE, USB_CONTROLLER_CLASS, USB_PLANE,
};

/// Everything we learn about the registry during a single enumeration.
/// Lives only as long as one call to [enumerate_registry].
#[derive(Debug, Default)]
struct EnumerationContext {
    /// Controllers, in the order the registry handed them to us.
    controllers: Vec<RegistryId>,

    names: HashMap<RegistryId, String>,
    vendors: HashMap<RegistryId, String>,
    vendor_ids: HashMap<RegistryId, String>,
    product_ids: HashMap<RegistryId, String>,
    serials: HashMap<RegistryId, String>,

    /// Effective parent -> children, as given by the IOUSB plane.
    hubs: HashMap<RegistryId, Vec<RegistryId>>,
}

/// Formats an idVendor / idProduct number; these are 16-bit, so anything above is dropped.
fn format_usb_id(value: i64) -> String {
    format!("{:04x}", value & 0xffff)
}

/// Formats a PCI vendor-id / device-id blob. These are little-endian, so the low byte comes first.
fn format_pci_id(bytes: &[u8]) -> Option<String> {
    match bytes {
        [low, high, ..] => Some(format!("{:02x}{:02x}", high, low)),
        _ => None,
    }
}

/// Fetches an entry's registry ID, refusing the zero ID no real entry can have.
fn entry_id<R: Registry>(registry: &R, entry: &R::Entry) -> UsbResult<RegistryId> {
    let id = registry.registry_id(entry)?;
    if id == 0 {
        return Err(Error::Internal("registry entry has a zero ID".into()));
    }

    Ok(id)
}

/// Reads an optional string property; a missing property is not an error, a non-string one is.
fn read_string<R: Registry>(
    registry: &R,
    entry: &R::Entry,
    key: &str,
) -> UsbResult<Option<String>> {
    match registry.property(entry, key) {
        None => Ok(None),
        Some(value) => registry
            .as_string(&value)
            .map(Some)
            .ok_or_else(|| decode_failure(key, "string")),
    }
}

/// Reads an optional numeric property.
fn read_number<R: Registry>(registry: &R, entry: &R::Entry, key: &str) -> UsbResult<Option<i64>> {
    match registry.property(entry, key) {
        None => Ok(None),
        Some(value) => registry
            .as_number(&value)
            .map(Some)
            .ok_or_else(|| decode_failure(key, "number")),
    }
}

/// Reads an optional data-blob property.
fn read_data<R: Registry>(
    registry: &R,
    entry: &R::Entry,
    key: &str,
) -> UsbResult<Option<Vec<u8>>> {
    match registry.property(entry, key) {
        None => Ok(None),
        Some(value) => registry
            .as_data(&value)
            .map(Some)
            .ok_or_else(|| decode_failure(key, "data blob")),
    }
}

fn decode_failure(key: &str, expected: &'static str) -> Error {
    Error::PropertyDecodeFailed {
        key: key.to_string(),
        expected,
    }
}

impl EnumerationContext {
    /// Walks every USB controller in the registry, and every service below each one.
    fn walk<R: Registry>(&mut self, registry: &R) -> UsbResult<()> {
        let root_id = {
            let root = registry.root()?;
            registry.registry_id(&root)?
        };

        for controller in registry.services_of_class(USB_CONTROLLER_CLASS)? {
            let controller_id = entry_id(registry, &controller)?;
            let name = registry.name(&controller)?;
            debug!("found USB controller {} ({:#x})", name, controller_id);

            self.controllers.push(controller_id);
            self.names.insert(controller_id, name);

            // Controllers don't carry their own IDs; the only lead we have is the
            // locationID, which we can use to find the PCI device backing them.
            if let Some(location) = registry.property(&controller, keys::LOCATION_ID) {
                self.resolve_controller_ids(registry, controller_id, &location)?;
            }

            for child in registry.children(&controller, SERVICE_PLANE)? {
                self.record_device(registry, controller_id, root_id, &child)?;
            }
        }

        Ok(())
    }

    /// Finds the PCI entry sharing a controller's locationID, and takes its vendor / device IDs.
    ///
    /// Stops at the first service that supplied either ID, even if it only supplied one.
    fn resolve_controller_ids<R: Registry>(
        &mut self,
        registry: &R,
        controller_id: RegistryId,
        location: &R::Value,
    ) -> UsbResult<()> {
        for service in registry.services_with_property(keys::LOCATION_ID, location)? {
            // The IDs live on the PCI device, which is the matched service's parent.
            let Some(pci_device) = registry.parent(&service, SERVICE_PLANE)? else {
                continue;
            };

            let mut found = false;

            let vendor_id = read_data(registry, &pci_device, keys::PCI_VENDOR_ID)?;
            if let Some(vendor_id) = vendor_id.as_deref().and_then(format_pci_id) {
                debug!("controller {:#x} has PCI vendor {}", controller_id, vendor_id);
                self.vendor_ids.insert(controller_id, vendor_id);
                found = true;
            }

            let product_id = read_data(registry, &pci_device, keys::PCI_DEVICE_ID)?;
            if let Some(product_id) = product_id.as_deref().and_then(format_pci_id) {
                debug!("controller {:#x} has PCI device {}", controller_id, product_id);
                self.product_ids.insert(controller_id, product_id);
                found = true;
            }

            if found {
                break;
            }
        }

        Ok(())
    }

    /// Records a single service found below a controller.
    fn record_device<R: Registry>(
        &mut self,
        registry: &R,
        controller_id: RegistryId,
        root_id: RegistryId,
        device: &R::Entry,
    ) -> UsbResult<()> {
        let device_id = entry_id(registry, device)?;

        let Some(parent) = registry.parent(device, USB_PLANE)? else {
            warn!(
                "skipping {:#x}, which isn't attached in the {} plane",
                device_id, USB_PLANE
            );
            return Ok(());
        };
        let mut parent_id = entry_id(registry, &parent)?;

        // Devices plugged straight into a root port have the registry root as their
        // USB parent; hang them off their controller instead.
        if parent_id == root_id {
            parent_id = controller_id;
        }

        let name = registry.name(device)?;
        trace!("found {} ({:#x}) under {:#x}", name, device_id, parent_id);

        self.hubs.entry(parent_id).or_default().push(device_id);
        self.names.insert(device_id, name);

        if let Some(vendor) = read_string(registry, device, keys::VENDOR_NAME)? {
            self.vendors.insert(device_id, vendor);
        }
        if let Some(vendor_id) = read_number(registry, device, keys::VENDOR_ID)? {
            self.vendor_ids.insert(device_id, format_usb_id(vendor_id));
        }
        if let Some(product_id) = read_number(registry, device, keys::PRODUCT_ID)? {
            self.product_ids.insert(device_id, format_usb_id(product_id));
        }
        if let Some(serial) = read_string(registry, device, keys::SERIAL_NUMBER)? {
            self.serials.insert(device_id, serial);
        }

        Ok(())
    }

    /// Builds the node for `id` and everything below it.
    ///
    /// Nodes without IDs of their own take their parent's. `lineage` holds the IDs
    /// of every node above this one, so a malformed hub map can't recurse forever.
    fn build(
        &self,
        id: RegistryId,
        inherited_vendor_id: &str,
        inherited_product_id: &str,
        lineage: &mut Vec<RegistryId>,
    ) -> UsbResult<UsbNode> {
        if lineage.contains(&id) {
            return Err(Error::Internal(format!(
                "registry entry {:#x} is its own ancestor",
                id
            )));
        }

        let vendor_id = self
            .vendor_ids
            .get(&id)
            .map_or(inherited_vendor_id, String::as_str);
        let product_id = self
            .product_ids
            .get(&id)
            .map_or(inherited_product_id, String::as_str);

        lineage.push(id);
        let mut children = self
            .hubs
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|&child| self.build(child, vendor_id, product_id, lineage))
            .collect::<UsbResult<Vec<UsbNode>>>()?;
        lineage.pop();

        children.sort_by(UsbNode::cmp_topology);

        Ok(UsbNode {
            name: self
                .names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("{}:{}", vendor_id, product_id)),
            vendor: self.vendors.get(&id).cloned().unwrap_or_default(),
            vendor_id: vendor_id.to_string(),
            product_id: product_id.to_string(),
            serial: self.serials.get(&id).cloned().unwrap_or_default(),
            children,
        })
    }
}

/// Enumerates the USB topology of the given registry: one tree per host controller,
/// in the order the registry reports the controllers.
///
/// Either the whole topology comes back, or an error does; never part of a tree.
pub fn enumerate_registry<R: Registry>(registry: &R) -> UsbResult<Vec<UsbNode>> {
    let mut context = EnumerationContext::default();
    context.walk(registry)?;

    context
        .controllers
        .iter()
        .map(|&controller| context.build(controller, UNKNOWN_ID, UNKNOWN_ID, &mut vec![]))
        .collect()
}
